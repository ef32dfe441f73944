use super::base::{Instrument, InstrumentConfig, InstrumentRef, Target};
use crate::model::Callable;

/// Several instruments applied as one layer. The first listed sits closest
/// to the wrapped callable; all of them receive the same config.
pub struct Composed {
    layers: Vec<InstrumentRef>,
}

impl Composed {
    pub fn new(layers: Vec<InstrumentRef>) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[InstrumentRef] {
        &self.layers
    }
}

impl Instrument for Composed {
    fn wrap(&self, target: &Target, method: Callable, config: &InstrumentConfig) -> Callable {
        self.layers
            .iter()
            .fold(method, |inner, layer| layer.wrap(target, inner, config))
    }

    fn name(&self) -> &str {
        "Composed"
    }
}

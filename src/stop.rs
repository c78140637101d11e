use std::sync::{

    atomic::{
        AtomicBool,
        Ordering,
    },

    Arc,
};

/// Cooperative stop request, checked by the controllers between probes.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> StopFlag {
        Default::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

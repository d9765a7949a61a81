use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("commutation fault injected after {0} enqueues")]
    CommutationFault(u32),
    #[error("lock-in spin failed: {0}")]
    Lockin(String),
    #[error("control loop exceeded tick budget of {0}")]
    TickBudget(u64),
}

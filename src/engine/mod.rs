//! Engine modules: the planning core.
//!
//! Actions are constructed against a [`DeviceTree`](crate::devices::DeviceTree),
//! registered in an [`ActionQueue`](queue::ActionQueue), ordered into a
//! [`Plan`](scheduler::Plan) and applied by an [`Executor`](executor::Executor).

pub mod action;
pub mod executor;
pub mod queue;
pub mod scheduler;

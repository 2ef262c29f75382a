mod checkpoint;
mod driver;
mod engine;
mod error;
mod options;
mod path;
mod phase;
mod plan;
mod scheduler;
mod simpoint;
mod stop;
mod synthetic;
mod utils;

pub use checkpoint::*;
pub use driver::*;
pub use engine::*;
pub use error::*;
pub use options::*;
pub use path::*;
pub use phase::*;
pub use plan::*;
pub use scheduler::*;
pub use simpoint::*;
pub use stop::*;
pub use synthetic::*;
pub use utils::*;

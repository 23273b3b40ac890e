mod history;
mod inventory;
mod sync;

pub use history::*;
pub use inventory::*;
pub use sync::*;

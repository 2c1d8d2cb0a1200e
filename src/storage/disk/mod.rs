mod disk_io;
mod disk_manager;
mod disk_scheduler;
mod memory_disk;

pub use disk_io::*;
pub use disk_manager::*;
pub use disk_scheduler::*;
pub use memory_disk::*;

//! Package archive I/O (spec §4.3): reader, writer, entry model, the
//! pack/unpack glob filter, and the unpack driver.

mod entry;
mod filter;
mod reader;
mod unpack;
mod writer;

pub use entry::{Entry, PackMethod};
pub use filter::EntryFilter;
pub use reader::{EntrySubStream, PaReader};
pub use unpack::unpack_to_dir;
pub use writer::{FileProducer, PaWriter};

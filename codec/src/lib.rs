mod byron;
mod cbor;
mod envelope;
mod error;
mod header;
mod praos;
mod tpraos;

pub use byron::*;
pub use envelope::*;
pub use error::*;
pub use header::*;
pub use praos::*;
pub use tpraos::*;

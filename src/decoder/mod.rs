//! Account decoder: discriminator checks plus the wire schemas for
//! Reserve, Obligation, and oracle price accounts.

pub mod discriminator;
pub mod obligation;
pub mod oracle_price;
pub mod reserve;

pub use obligation::{decode_obligation, BorrowSlot, DepositSlot, Obligation};
pub use oracle_price::{OraclePrice, OracleType};
pub use reserve::{decode_reserve, Reserve};

pub mod behavioral;
pub mod consent;
pub mod driver;
pub mod fingerprint;
pub mod page;
pub mod stealth;

pub mod account;
pub mod regex;

pub mod binance;
pub mod telegram;

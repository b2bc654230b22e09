pub mod binance_gateway;
pub mod binance_stream;

pub use binance_gateway::BinanceGateway;
pub use binance_stream::BinanceMarketStream;

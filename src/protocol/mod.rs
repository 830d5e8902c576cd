pub mod codec;
pub mod modbus;
pub mod register_map;
pub mod ws;

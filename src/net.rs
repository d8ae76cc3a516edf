pub mod checksum;
pub mod cursor;
pub mod frame;
pub mod mac;
pub mod rawsock;
pub mod reply;

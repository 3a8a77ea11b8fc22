//! Default values shared by the middleware services

/// Name server defaults
pub mod name_server {
    pub const HOST: &str = "127.0.0.1";

    pub const PORT: u16 = 10_000;

    /// Name the server registers itself under
    pub const NAMESPACE: &str = "/root";

    /// Registrants get ports starting this far above the server's own
    pub const PORT_OFFSET: i32 = 2;

    pub const LEGACY_STEP: i32 = 10;

    pub const TMP_PREFIX: &str = "/tmp/port/";
}

/// Protocol layer defaults
pub mod protocol {
    /// Carrier registration order; earlier carriers win header ties
    pub const CARRIERS: &[&str] = &[
        "tcp", "fast_tcp", "text", "text_ack", "name_ser", "udp", "mcast", "shmem", "crc",
    ];

    /// First block size of a serialization buffer pool (bytes)
    pub const INITIAL_POOL_SIZE: usize = 1024;

    /// Largest pool block a serialization buffer grows to (bytes)
    pub const MAX_POOL_BLOCK: usize = 65_536;

    /// Largest message payload a connection accepts (bytes)
    pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;
}

pub mod artifacts;
pub mod loopback;
pub mod runs;

//! Wire types shared between the daemon's control server and `sttctl`.

pub mod wire;

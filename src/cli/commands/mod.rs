mod init;

pub use init::cmd_init;

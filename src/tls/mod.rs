pub mod cert;
pub mod provider;

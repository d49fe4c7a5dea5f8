pub mod build;
pub mod keygen;
pub mod resolve;
pub mod sign;
pub mod toolchain;
pub mod verify;

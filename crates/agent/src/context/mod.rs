//! Context window assembly.
//!
//! A window is always `[persona] + [recent turns, oldest first] + [new input]`.
//! History shorter than the window size simply yields a shorter window.

pub mod assembler;

pub use assembler::ContextAssembler;

// Core modules implementing class parsing, closure, and stub emission.
pub mod bytes;
pub mod classfile;
pub mod collect;
pub mod desc;
pub mod emit;
pub mod error;
pub mod index;
pub mod jar;
pub mod metadata;
pub mod roots;

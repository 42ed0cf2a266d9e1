//! Integration tests for the VM
//!
//! Modules are built through `ModuleBuilder`, registered in a private
//! registry and executed through `Module` handles.

mod helpers;

mod sample_programs;

//! Property-based tests for the context stack

mod slot_sequences;

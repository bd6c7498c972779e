pub mod rasflow;

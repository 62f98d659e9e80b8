pub mod eo3;

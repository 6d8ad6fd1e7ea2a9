// Domain modules

pub mod entityset;

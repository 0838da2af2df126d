//! Config engine (spec §4.1): macro preprocessor, recursive-descent
//! parser, rapifier, and derapifier/path-query surface.

mod ast;
mod derapify;
mod lineref;
mod parser;
mod preprocessor;
mod rapify;

pub use ast::{Class, Config, Definition, Expr, Variable};
pub use derapify::{
    derapify_bytes, find_class_path, read_class_names, read_float, read_int, read_string,
    read_string_array, seek_config_value, to_text, ReadError,
};
pub use lineref::Lineref;
pub use parser::{parse_config, resolve_original_line};
pub use preprocessor::{FilesystemResolver, IncludeResolver, MemoryResolver, PreprocessOutput, Preprocessor};
pub use rapify::rapify_config;

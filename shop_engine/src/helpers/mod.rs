mod validation;

pub use validation::{is_blank, is_valid_color_hex, is_valid_email, is_valid_sku};

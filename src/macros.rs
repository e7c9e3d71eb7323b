//! # Internal Macros
//!
//! This module provides internal macros for reducing boilerplate in burrowdb.
//!
//! ## zerocopy_accessors!
//!
//! Generates getter and setter methods for zerocopy struct fields that use
//! little-endian wrapper types (U32, U64).
//!
//! ### Usage
//!
//! ```ignore
//! use zerocopy::little_endian::{U32, U64};
//!
//! #[repr(C)]
//! struct Header {
//!     blob_size: U64,
//!     num_pages: U32,
//! }
//!
//! impl Header {
//!     zerocopy_accessors! {
//!         blob_size: u64,
//!         num_pages: u32,
//!     }
//! }
//!
//! // Generates:
//! // pub fn blob_size(&self) -> u64 { self.blob_size.get() }
//! // pub fn set_blob_size(&mut self, val: u64) { self.blob_size = U64::new(val); }
//! // pub fn num_pages(&self) -> u32 { self.num_pages.get() }
//! // pub fn set_num_pages(&mut self, val: u32) { self.num_pages = U32::new(val); }
//! ```

/// Generates getter and setter methods for zerocopy little-endian fields.
#[macro_export]
macro_rules! zerocopy_accessors {
    (@impl $field:ident, u32) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u32 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u32) {
                self.$field = ::zerocopy::little_endian::U32::new(val);
            }
        }
    };
    (@impl $field:ident, u64) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u64 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u64) {
                self.$field = ::zerocopy::little_endian::U64::new(val);
            }
        }
    };
    ($($field:ident : $ty:tt),* $(,)?) => {
        $(
            $crate::zerocopy_accessors!(@impl $field, $ty);
        )*
    };
}

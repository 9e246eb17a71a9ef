// SPDX-License-Identifier: MIT

//! Declarative macros for reducing boilerplate.
//!
//! - [`text_enum!`] — both text directions of a status/mode enum in one list
//! - [`row_builder!`] — test builder for store-row types

/// Define both text directions of a C-like enum in one literal list.
///
/// Statuses, modes, and event kinds cross process boundaries as TEXT: they
/// live in store columns written by one process and read back by another.
/// `as_str`/`Display` write that representation and `parse` reads it, and
/// keeping the two directions in a single macro call means a variant
/// cannot be added to one side and forgotten on the other.
///
/// ```ignore
/// lectern_core::text_enum! {
///     MyStatus {
///         Pending => "pending",
///         Done => "done",
///     }
/// }
/// ```
#[macro_export]
macro_rules! text_enum {
    // The text must be a literal: it appears in both expression position
    // (as_str) and pattern position (parse).
    ($enum:ident { $( $variant:ident => $text:literal ),+ $(,)? }) => {
        impl $enum {
            /// The store/log text for this variant.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }

            /// Parse the store's TEXT representation; `None` for text this
            /// build does not know.
            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $( $text => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Generate a test builder for a store-row type.
///
/// Row structs normally only come back out of SQLite; tests that need one
/// directly (freshness math, transition checks, mapping helpers) fabricate
/// it here instead of inserting and re-reading. `fields` entries carry a
/// plausible row default and get an `impl Into` setter; `optional` entries
/// are nullable columns, start as `None`, and their setters wrap in
/// `Some`. Defaults for numeric columns must be written with their type
/// suffix (`0u32`) since every default goes through `Into`.
///
/// All generated items are gated behind `#[cfg(any(test, feature = "test-support"))]`.
///
/// ```ignore
/// lectern_core::row_builder! {
///     pub struct FooBuilder => Foo {
///         fields {
///             name: String = "test",
///             count: u32 = 0u32,
///         }
///         optional {
///             finished_at: u64,
///         }
///     }
/// }
/// ```
#[macro_export]
macro_rules! row_builder {
    (
        pub struct $builder:ident => $target:ident {
            fields {
                $( $field:ident : $ty:ty = $default:expr ),+ $(,)?
            }
            $(optional {
                $( $opt:ident : $opt_ty:ty ),+ $(,)?
            })?
        }
    ) => {
        #[cfg(any(test, feature = "test-support"))]
        pub struct $builder {
            $( $field: $ty, )+
            $($( $opt: Option<$opt_ty>, )+)?
        }

        #[cfg(any(test, feature = "test-support"))]
        impl Default for $builder {
            fn default() -> Self {
                Self {
                    $( $field: $default.into(), )+
                    $($( $opt: None, )+)?
                }
            }
        }

        #[cfg(any(test, feature = "test-support"))]
        impl $builder {
            $(
                pub fn $field(mut self, v: impl Into<$ty>) -> Self {
                    self.$field = v.into();
                    self
                }
            )+

            $($(
                pub fn $opt(mut self, v: impl Into<$opt_ty>) -> Self {
                    self.$opt = Some(v.into());
                    self
                }
            )+)?

            pub fn build(self) -> $target {
                $target {
                    $( $field: self.$field, )+
                    $($( $opt: self.$opt, )+)?
                }
            }
        }

        #[cfg(any(test, feature = "test-support"))]
        impl $target {
            /// Builder pre-filled with plausible row defaults.
            pub fn builder() -> $builder {
                $builder::default()
            }
        }
    };
}

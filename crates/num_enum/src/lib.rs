#![no_std]

/// Declares a fieldless enum with an explicit primitive representation,
/// together with lossless conversions to and from that primitive.
///
/// ```
/// num_enum::num_enum! {
///     /// Where a seek starts from
///     pub Whence: u8 {
///         Set = 0,
///         End = 2,
///     }
/// }
///
/// assert_eq!(Whence::from_primitive(2), Some(Whence::End));
/// assert_eq!(Whence::from_primitive(1), None);
/// assert_eq!(u8::from(Whence::Set), 0);
/// ```
#[macro_export]
macro_rules! num_enum {
    (
        $(#[$attr:meta])*
        $v:vis $name:ident: $repr:ident {
            $( $(#[$item_attr:meta])* $item_name:ident = $item_value:literal ),+ $(,)?
        }
    ) => {
        $(#[$attr])*
        #[repr($repr)]
        #[derive(Eq, PartialEq, Debug, Copy, Clone)]
        $v enum $name {
            $( $(#[$item_attr])* $item_name = $item_value ),+
        }

        impl $name {
            pub const fn from_primitive(item: $repr) -> Option<Self> {
                match item {
                    $( $item_value => Some($name::$item_name), )+
                    _ => None,
                }
            }

            pub const fn to_primitive(self) -> $repr {
                self as $repr
            }
        }

        impl From<$name> for $repr {
            fn from(item: $name) -> Self {
                item as $repr
            }
        }
    };
}

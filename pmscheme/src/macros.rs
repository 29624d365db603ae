// SPDX-License-Identifier: MIT

#[macro_export]
/// Defines the set of well-known GUID partition types.
///
/// For each `$name => $desc, $guid` this generates:
/// - `pub const GUID_TYPE_<NAME>: [u8; 16]` — the type GUID in on-disk
///   (little-endian fields) order.
/// - `pub fn is_<name>_type(&[u8; 16]) -> bool` — match against an
///   on-disk type GUID.
///
/// Also generates the `GuidTypeKind` enum with `from_guid`, `from_hint`
/// (matching a stringified display-order GUID) and a `Display` of the
/// description. Requires the `paste` crate for identifier concatenation.
macro_rules! define_guid_types {
    (
        $(
            $name:ident => $desc:expr, $guid:expr
        ),+ $(,)?
    ) => {
        paste::paste! {
            $(
                #[doc = $desc]
                pub const [<GUID_TYPE_ $name:snake:upper>]: [u8; 16] = $guid;

                #[doc = concat!("Checks whether an on-disk type GUID is: ", $desc)]
                pub fn [<is_ $name:snake _type>](guid: &[u8; 16]) -> bool {
                    guid == &[<GUID_TYPE_ $name:snake:upper>]
                }
            )+

            /// Well-known partition type, for display purposes only.
            #[derive(Debug, Clone, PartialEq, Eq)]
            pub enum GuidTypeKind {
                $($name,)+
                Unknown([u8; 16]),
            }

            impl GuidTypeKind {
                /// Classifies an on-disk (little-endian fields) type GUID.
                pub fn from_guid(guid: &[u8; 16]) -> Self {
                    match guid {
                        $(g if g == &[<GUID_TYPE_ $name:snake:upper>] => Self::$name,)+
                        other => Self::Unknown(*other),
                    }
                }

                /// Classifies a stringified display-order type GUID, the
                /// form carried in a descriptor's type hint.
                pub fn from_hint(hint: &str) -> Self {
                    $(
                        let display = $crate::uuid::unswapped([<GUID_TYPE_ $name:snake:upper>]);
                        if hint.eq_ignore_ascii_case(&$crate::uuid::unparse(&display)) {
                            return Self::$name;
                        }
                    )+
                    Self::Unknown([0u8; 16])
                }

                pub fn as_guid(&self) -> Option<&'static [u8; 16]> {
                    match self {
                        $(Self::$name => Some(&[<GUID_TYPE_ $name:snake:upper>]),)+
                        Self::Unknown(_) => None,
                    }
                }
            }

            impl core::fmt::Display for GuidTypeKind {
                fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                    match self {
                        $(Self::$name => write!(f, $desc),)+
                        Self::Unknown(guid) => write!(f, "Unknown ({:02X?})", guid),
                    }
                }
            }
        }
    };
}

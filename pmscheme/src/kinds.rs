// SPDX-License-Identifier: MIT

//! Well-known GUID partition types. Purely informational: a descriptor's
//! type hint stays the stringified GUID, these names are for rendering.

define_guid_types! {
    EfiSystem => "EFI System",
        [0x28, 0x73, 0x2A, 0xC1, 0x1F, 0xF8, 0xD2, 0x11, 0xBA, 0x4B, 0x00, 0xA0, 0xC9, 0x3E, 0xC9, 0x3B],
    BasicData => "Basic Data",
        [0xA2, 0xA0, 0xD0, 0xEB, 0xE5, 0xB9, 0x33, 0x44, 0x87, 0xC0, 0x68, 0xB6, 0xB7, 0x26, 0x99, 0xC7],
    AppleHfs => "Apple HFS+",
        [0x00, 0x53, 0x46, 0x48, 0x00, 0x00, 0xAA, 0x11, 0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC],
    AppleApfs => "Apple APFS",
        [0xEF, 0x57, 0x34, 0x7C, 0x00, 0x00, 0xAA, 0x11, 0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC],
    LinuxFs => "Linux Filesystem",
        [0xAF, 0x3D, 0xC6, 0x0F, 0x83, 0x84, 0x72, 0x47, 0x8E, 0x79, 0x3D, 0x69, 0xD8, 0x47, 0x7D, 0xE4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_on_disk_guid() {
        assert_eq!(
            GuidTypeKind::from_guid(&GUID_TYPE_BASIC_DATA),
            GuidTypeKind::BasicData
        );
        assert!(matches!(
            GuidTypeKind::from_guid(&[0x42; 16]),
            GuidTypeKind::Unknown(_)
        ));
        assert!(is_efi_system_type(&GUID_TYPE_EFI_SYSTEM));
        assert!(!is_efi_system_type(&GUID_TYPE_BASIC_DATA));
    }

    #[test]
    fn classify_type_hint() {
        assert_eq!(
            GuidTypeKind::from_hint("EBD0A0A2-B9E5-4433-87C0-68B6B72699C7"),
            GuidTypeKind::BasicData
        );
        assert_eq!(
            GuidTypeKind::from_hint("c12a7328-f81f-11d2-ba4b-00a0c93ec93b"),
            GuidTypeKind::EfiSystem
        );
        assert!(matches!(
            GuidTypeKind::from_hint("not-a-guid"),
            GuidTypeKind::Unknown(_)
        ));
    }

    #[test]
    fn display_names() {
        assert_eq!(GuidTypeKind::AppleHfs.to_string(), "Apple HFS+");
        assert_eq!(
            GuidTypeKind::from_hint("48465300-0000-11AA-AA11-00306543ECAC"),
            GuidTypeKind::AppleHfs
        );
    }
}

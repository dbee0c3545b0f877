//! Pure, table-driven classification of raw device properties.
//!
//! The platform backend hands this module the handful of free-text
//! properties it read for a device (bus-enumerator class name, hardware
//! id, removal-policy byte, friendly name) and gets back the full set of
//! safety flags. Classification is deterministic and does no I/O, so the
//! policy that decides which devices are "safe to wipe" can be audited
//! and tested against literal string inputs, independently of any device
//! traversal code.

/// Hardware-id signatures of known virtual-disk adapters. A device whose
/// hardware id exactly matches an entry is a virtual disk.
pub const VHD_HARDWARE_IDS: [&str; 4] = [
    "Arsenal_________Virtual_",
    "KernSafeVirtual_________",
    "Msft____Virtual_Disk____",
    "VMware__VMware_Virtual_S",
];

/// Enumerator names of USB storage stacks, including UAS-capable stacks
/// and several vendor USB card-reader drivers.
pub const USB_STORAGE_DRIVERS: [&str; 8] = [
    "USBSTOR", "UASPSTOR", "VUSBSTOR", "RTUSER", "CMIUCR", "EUCR", "ETRONSTOR", "ASUSSTPT",
];

/// Enumerator names of generic storage stacks: native SCSI, SD, and a
/// number of vendor card-reader drivers.
pub const GENERIC_STORAGE_DRIVERS: [&str; 15] = [
    "SCSI", "SD", "PCISTOR", "RTSOR", "JMCR", "JMCF", "RIMMPTSK", "RIMSPTSK", "RIXDPTSK",
    "TI21SONY", "ESD7SK", "ESM7SK", "O2MD", "O2SD", "VIACR",
];

/// The literal enumerator name of the SD-card bus.
const SD_CARD_ENUMERATOR: &str = "SD";

/// The platform's expectation for how a device is physically removed,
/// decoded from the raw removal-policy byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalPolicy {
    /// The device is never expected to be removed.
    ExpectNoRemoval,
    /// The device is expected to be removed after an orderly eject.
    ExpectOrderlyRemoval,
    /// The device may be yanked at any time.
    ExpectSurpriseRemoval,
    /// Anything else, including a missing property.
    Unknown,
}

impl RemovalPolicy {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => RemovalPolicy::ExpectNoRemoval,
            2 => RemovalPolicy::ExpectOrderlyRemoval,
            3 => RemovalPolicy::ExpectSurpriseRemoval,
            _ => RemovalPolicy::Unknown,
        }
    }

    /// Only orderly and surprise removal count as removable; "expect no
    /// removal" and unknown values both yield false.
    pub fn is_removable(self) -> bool {
        matches!(
            self,
            RemovalPolicy::ExpectOrderlyRemoval | RemovalPolicy::ExpectSurpriseRemoval
        )
    }
}

/// The raw property set the backend reads for one device. Fields the
/// backend could not obtain stay at their defaults; that is "insufficient
/// data", not an error, and classifies to all-false flags.
#[derive(Clone, Debug, Default)]
pub struct RawDeviceProps {
    /// Bus-enumerator class name, e.g. "SCSI" or "USBSTOR".
    pub enumerator: String,
    /// Friendly device name, used as the descriptor description.
    pub friendly_name: String,
    /// Hardware id string, matched against the virtual-disk table.
    pub hardware_id: String,
    /// Raw removal-policy byte as reported by the platform.
    pub removal_policy: u8,
}

/// The boolean flag set derived from one [`RawDeviceProps`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    pub is_removable: bool,
    pub is_virtual: bool,
    pub is_scsi: bool,
    pub is_usb: bool,
    pub is_card: bool,
    pub is_system: bool,
    pub is_uas: bool,
}

/// The membership tables the classifier consults. `Default` yields the
/// built-in tables above; tests (or a future config layer) can substitute
/// their own without touching traversal code.
#[derive(Clone, Debug)]
pub struct ClassifierPolicy {
    pub virtual_hardware_ids: Vec<&'static str>,
    pub usb_storage_drivers: Vec<&'static str>,
    pub generic_storage_drivers: Vec<&'static str>,
    pub sd_card_enumerator: &'static str,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        ClassifierPolicy {
            virtual_hardware_ids: VHD_HARDWARE_IDS.to_vec(),
            usb_storage_drivers: USB_STORAGE_DRIVERS.to_vec(),
            generic_storage_drivers: GENERIC_STORAGE_DRIVERS.to_vec(),
            sd_card_enumerator: SD_CARD_ENUMERATOR,
        }
    }
}

impl ClassifierPolicy {
    /// Derives the full flag set for one device.
    ///
    /// The rules are evaluated independently; only `is_system` and
    /// `is_uas` depend on the others. `is_system` and `is_removable` are
    /// mutually exclusive by construction, and `is_uas` is always
    /// `is_scsi && is_removable && !is_virtual && !is_card`.
    pub fn classify(&self, props: &RawDeviceProps) -> Classification {
        let enumerator = props.enumerator.as_str();

        let is_removable = RemovalPolicy::from_raw(props.removal_policy).is_removable();
        // An empty hardware id means the property was unobtainable, which
        // is not evidence of a virtual disk.
        let is_virtual = !props.hardware_id.is_empty()
            && self
                .virtual_hardware_ids
                .iter()
                .any(|id| *id == props.hardware_id);
        let is_scsi = self.generic_storage_drivers.iter().any(|d| *d == enumerator);
        let is_usb = self.usb_storage_drivers.iter().any(|d| *d == enumerator);
        let is_card = enumerator == self.sd_card_enumerator;
        let is_system = !is_removable && (enumerator == "SCSI" || enumerator == "IDE");
        let is_uas = is_scsi && is_removable && !is_virtual && !is_card;

        Classification {
            is_removable,
            is_virtual,
            is_scsi,
            is_usb,
            is_card,
            is_system,
            is_uas,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(enumerator: &str, hardware_id: &str, removal_policy: u8) -> RawDeviceProps {
        RawDeviceProps {
            enumerator: enumerator.to_string(),
            hardware_id: hardware_id.to_string(),
            removal_policy,
            ..Default::default()
        }
    }

    #[test]
    fn removal_policy_decoding() {
        assert!(!RemovalPolicy::from_raw(1).is_removable());
        assert!(RemovalPolicy::from_raw(2).is_removable());
        assert!(RemovalPolicy::from_raw(3).is_removable());
        assert!(!RemovalPolicy::from_raw(0).is_removable());
        assert!(!RemovalPolicy::from_raw(255).is_removable());
    }

    #[test]
    fn usb_stick_is_usb_not_system() {
        let c = ClassifierPolicy::default().classify(&props("USBSTOR", "", 3));
        assert!(c.is_usb);
        assert!(c.is_removable);
        assert!(!c.is_system);
        assert!(!c.is_scsi);
        assert!(!c.is_uas);
    }

    #[test]
    fn fixed_scsi_disk_is_system() {
        let c = ClassifierPolicy::default().classify(&props("SCSI", "", 1));
        assert!(c.is_system);
        assert!(c.is_scsi);
        assert!(!c.is_removable);
        assert!(!c.is_uas);
    }

    #[test]
    fn removable_scsi_disk_is_uas() {
        let c = ClassifierPolicy::default().classify(&props("SCSI", "", 2));
        assert!(c.is_uas);
        assert!(!c.is_system);
    }

    #[test]
    fn virtual_disk_is_never_uas() {
        let c =
            ClassifierPolicy::default().classify(&props("SCSI", "Msft____Virtual_Disk____", 2));
        assert!(c.is_virtual);
        assert!(!c.is_uas);
    }

    #[test]
    fn sd_card_is_scsi_and_card_but_not_uas() {
        let c = ClassifierPolicy::default().classify(&props("SD", "", 3));
        assert!(c.is_card);
        assert!(c.is_scsi);
        assert!(!c.is_uas);
    }

    #[test]
    fn empty_props_classify_to_all_false() {
        let c = ClassifierPolicy::default().classify(&RawDeviceProps::default());
        assert_eq!(c, Classification::default());
    }

    #[test]
    fn classification_is_deterministic() {
        let policy = ClassifierPolicy::default();
        let p = props("UASPSTOR", "VMware__VMware_Virtual_S", 2);
        let first = policy.classify(&p);
        for _ in 0..10 {
            assert_eq!(policy.classify(&p), first);
        }
    }

    #[test]
    fn invariants_hold_across_the_input_space() {
        // Every combination of table membership and removal policy must
        // keep the system/removable exclusion and the UAS derivation.
        let policy = ClassifierPolicy::default();
        let enumerators = ["SCSI", "IDE", "SD", "USBSTOR", "UASPSTOR", "JMCR", "bogus", ""];
        let hwids = ["", "Msft____Virtual_Disk____", "Samsung SSD"];
        for e in enumerators {
            for h in hwids {
                for rp in 0u8..=4 {
                    let c = policy.classify(&props(e, h, rp));
                    assert!(!(c.is_system && c.is_removable), "{e}/{h}/{rp}");
                    assert_eq!(
                        c.is_uas,
                        c.is_scsi && c.is_removable && !c.is_virtual && !c.is_card,
                        "{e}/{h}/{rp}"
                    );
                }
            }
        }
    }
}

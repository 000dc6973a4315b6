//! Board family ids, after the `uf2families.json` list maintained alongside
//! the UF2 format.  Used for display and for resolving names given on the
//! command line; nothing in the codec depends on it.

use serde::Serialize;
use std::fmt;

/// Family id of the Raspberry Pi RP2040, the default for new files.
pub const RP2040_FAMILY_ID: u32 = 0xe48b_ff56;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Family {
    pub id:          u32,
    pub name:        &'static str,
    pub description: &'static str,
}

static FAMILIES: &[Family] = &[
    Family { id: 0x16573617, name: "ATMEGA32", description: "Microchip (Atmel) ATmega32" },
    Family { id: 0x1851780a, name: "SAML21", description: "Microchip (Atmel) SAML21" },
    Family { id: 0x1b57745f, name: "NRF52", description: "Nordic NRF52" },
    Family { id: 0x1c5f21b0, name: "ESP32", description: "ESP32" },
    Family { id: 0x1e1f432d, name: "STM32L1", description: "ST STM32L1xx" },
    Family { id: 0x202e3a91, name: "STM32L0", description: "ST STM32L0xx" },
    Family { id: 0x21460ff0, name: "STM32WL", description: "ST STM32WLxx" },
    Family { id: 0x2abc77ec, name: "LPC55", description: "NXP LPC55xx" },
    Family { id: 0x300f5633, name: "STM32G0", description: "ST STM32G0xx" },
    Family { id: 0x31d228c6, name: "GD32F350", description: "GD32F350" },
    Family { id: 0x04240bdf, name: "STM32L5", description: "ST STM32L5xx" },
    Family { id: 0x4c71240a, name: "STM32G4", description: "ST STM32G4xx" },
    Family { id: 0x4fb2d5bd, name: "MIMXRT10XX", description: "NXP i.MX RT10XX" },
    Family { id: 0x53b80f00, name: "STM32F7", description: "ST STM32F7xx" },
    Family { id: 0x55114460, name: "SAMD51", description: "Microchip (Atmel) SAMD51" },
    Family { id: 0x57755a57, name: "STM32F4", description: "ST STM32F4xx" },
    Family { id: 0x5a18069b, name: "FX2", description: "Cypress FX2" },
    Family { id: 0x5d1a0a2e, name: "STM32F2", description: "ST STM32F2xx" },
    Family { id: 0x5ee21072, name: "STM32F1", description: "ST STM32F103" },
    Family { id: 0x621e937a, name: "NRF52833", description: "Nordic NRF52833" },
    Family { id: 0x647824b6, name: "STM32F0", description: "ST STM32F0xx" },
    Family { id: 0x68ed2b88, name: "SAMD21", description: "Microchip (Atmel) SAMD21" },
    Family { id: 0x6b846188, name: "STM32F3", description: "ST STM32F3xx" },
    Family { id: 0x6d0922fa, name: "STM32F407", description: "ST STM32F407" },
    Family { id: 0x6db66082, name: "STM32H7", description: "ST STM32H7xx" },
    Family { id: 0x70d16653, name: "STM32WB", description: "ST STM32WBxx" },
    Family { id: 0x7eab61ed, name: "ESP8266", description: "ESP8266" },
    Family { id: 0x7f83e793, name: "KL32L2", description: "NXP KL32L2x" },
    Family { id: 0x8fb060fe, name: "STM32F407VG", description: "ST STM32F407VG" },
    Family { id: 0xada52840, name: "NRF52840", description: "Nordic NRF52840" },
    Family { id: 0xbfdd4eee, name: "ESP32S2", description: "ESP32-S2" },
    Family { id: 0xc47e5767, name: "ESP32S3", description: "ESP32-S3" },
    Family { id: 0xd42ba06c, name: "ESP32C3", description: "ESP32-C3" },
    Family { id: 0x2b88d29c, name: "ESP32C2", description: "ESP32-C2" },
    Family { id: 0x332726f6, name: "ESP32H2", description: "ESP32-H2" },
    Family { id: 0xe48bff56, name: "RP2040", description: "Raspberry Pi RP2040" },
    Family { id: 0x00ff6919, name: "STM32L4", description: "ST STM32L4xx" },
    Family { id: 0x9af03e33, name: "GD32VF103", description: "GigaDevice GD32VF103" },
    Family { id: 0x4f6ace52, name: "CSK4", description: "LISTENAI CSK300x/400x" },
    Family { id: 0x6e7348a8, name: "CSK6", description: "LISTENAI CSK60xx" },
    Family { id: 0x11de784a, name: "M0SENSE", description: "M0SENSE BL702" },
];

impl Family {
    pub fn all() -> &'static [Family] {
        FAMILIES
    }

    pub fn by_id(id: u32) -> Option<&'static Family> {
        FAMILIES.iter().find(|f| f.id == id)
    }

    /// Case-insensitive lookup by short name (`"rp2040"`, `"SAMD51"`, ...).
    pub fn by_name(name: &str) -> Option<&'static Family> {
        FAMILIES.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#010x})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_id_and_name() {
        let rp = Family::by_id(RP2040_FAMILY_ID).unwrap();
        assert_eq!(rp.name, "RP2040");
        assert_eq!(Family::by_name("rp2040"), Some(rp));
        assert_eq!(Family::by_name("esp32s3").unwrap().id, 0xc47e5767);
        assert!(Family::by_id(0).is_none());
        assert!(Family::by_name("nope").is_none());
    }

    #[test]
    fn ids_and_names_are_unique() {
        for (i, a) in FAMILIES.iter().enumerate() {
            for b in &FAMILIES[i + 1..] {
                assert_ne!(a.id, b.id, "{a} / {b}");
                assert_ne!(a.name, b.name);
            }
        }
    }

    #[test]
    fn display() {
        assert_eq!(Family::by_name("SAMD21").unwrap().to_string(), "SAMD21 (0x68ed2b88)");
    }
}

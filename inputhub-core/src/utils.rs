// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use uuid::Uuid;

use std::time::SystemTime;

/// Returns true if nth bit in array is 1. Bits past the end of the array are 0.
#[allow(dead_code)]
pub fn test_bit(n: u16, array: &[u8]) -> bool {
    array
        .get((n / 8) as usize)
        .map_or(false, |byte| (byte >> (n % 8)) & 1 != 0)
}

pub fn time_now() -> SystemTime {
    SystemTime::now()
}

/// SDL compatible device uuid: bus, vendor, product and version as little endian 16 bit
/// words, each followed by a zero word.
#[allow(dead_code)]
pub fn sdl_uuid(bustype: u16, vendor: u16, product: u16, version: u16) -> Uuid {
    let [b0, b1] = bustype.to_le_bytes();
    let [v0, v1] = vendor.to_le_bytes();
    let [p0, p1] = product.to_le_bytes();
    let [r0, r1] = version.to_le_bytes();
    Uuid::from_bytes([b0, b1, 0, 0, v0, v1, 0, 0, p0, p1, 0, 0, r0, r1, 0, 0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_test_bit() {
        let buf = [0b1001_0001u8, 0b0010_0001];
        assert!(test_bit(0, &buf));
        assert!(!test_bit(3, &buf));
        assert!(test_bit(7, &buf));
        assert!(test_bit(8, &buf));
        assert!(!test_bit(15, &buf));
        assert!(!test_bit(16, &buf));
    }

    #[test]
    fn sdl_uuid_fields() {
        let x = Uuid::parse_str("030000005e0400008e02000020200000").unwrap();
        assert_eq!(x, sdl_uuid(0x3, 0x045e, 0x028e, 0x2020));
    }
}

//! Recoil-control hotkey dispatch table, routed from the keyboard channel.

use crate::recoil::RecoilSequence;

const KEY_PAGE_UP: u8 = 0x4B;
const KEY_PAGE_DOWN: u8 = 0x4E;
const KEY_1: u8 = 0x1E;
const KEY_2: u8 = 0x1F;
const KEY_EQUALS: u8 = 0x2E;
const KEY_MINUS: u8 = 0x2D;
const KEY_COMMA: u8 = 0x36;
const KEY_PERIOD: u8 = 0x37;

pub fn dispatch(code: u8, recoil: &mut RecoilSequence) {
    match code {
        KEY_PAGE_UP => recoil.enable(),
        KEY_PAGE_DOWN => recoil.disable(),
        KEY_1 => {
            let _ = recoil.load_preset(0);
        }
        KEY_2 => {
            let _ = recoil.load_preset(1);
        }
        KEY_EQUALS => recoil.adjust_coefficient(0.1),
        KEY_MINUS => recoil.adjust_coefficient(-0.1),
        KEY_COMMA => recoil.adjust_sensitivity(-0.1),
        KEY_PERIOD => recoil.adjust_sensitivity(0.1),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_up_enables_and_page_down_disables() {
        let mut recoil = RecoilSequence::new();
        dispatch(KEY_PAGE_UP, &mut recoil);
        assert!(recoil.is_enabled());
        dispatch(KEY_PAGE_DOWN, &mut recoil);
        assert!(!recoil.is_enabled());
    }

    #[test]
    fn coefficient_keys_adjust_by_one_tenth_and_clamp() {
        let mut recoil = RecoilSequence::new();
        let base = recoil.coefficient();
        dispatch(KEY_EQUALS, &mut recoil);
        assert!((recoil.coefficient() - (base + 0.1)).abs() < 1e-4);
        for _ in 0..200 {
            dispatch(KEY_EQUALS, &mut recoil);
        }
        assert!(recoil.coefficient() <= 10.0);
    }

    #[test]
    fn preset_keys_load_named_presets() {
        let mut recoil = RecoilSequence::new();
        dispatch(KEY_1, &mut recoil);
        assert_eq!(recoil.preset_name(), Some("OW2_Soldier76"));
        dispatch(KEY_2, &mut recoil);
        assert_eq!(recoil.preset_name(), Some("OW2_Cassidy"));
    }
}

//! zorder: the per-mixer pipe pool. Every started pipe holds exactly one z-order slot on its
//! mixer, so the slot table doubles as the record of how many pipes each mixer has in use.

use std::fmt;
use std::sync::Mutex;

use crate::overlay_utils::*;

/// Blend rank of a pipe on its mixer. 0 is the bottom stage.
pub type ZOrder = u32;

/// Pipes every mixer can drive concurrently.
pub const BASE_PIPES_PER_MIXER: usize = 2;
/// Ceiling on the per-mixer budget, the width of the slot bitmap.
pub const MAX_PIPES_PER_MIXER: usize = 4;

/// A physical display output's blending stage, one per framebuffer node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Mixer {
    Primary,
    External,
}

pub const NUM_MIXERS: usize = 2;

impl Mixer {
    /// Index of the `/dev/graphics/fb<N>` node driving this mixer.
    pub fn fb_index(self) -> usize {
        match self {
            Mixer::Primary => 0,
            Mixer::External => 1,
        }
    }
}

impl fmt::Display for Mixer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "fb{}", self.fb_index())
    }
}

/// Hands out z-order slots per mixer so concurrently active pipes never collide.
pub struct ZOrderManager {
    max_pipes: usize,
    slots: Mutex<[u8; NUM_MIXERS]>,
}

impl ZOrderManager {
    /// `true_mirror` targets carry one extra pipe per mixer for mirroring UI.
    pub fn new(true_mirror: bool) -> ZOrderManager {
        let max_pipes = if true_mirror {
            BASE_PIPES_PER_MIXER + 1
        } else {
            BASE_PIPES_PER_MIXER
        };
        ZOrderManager::with_budget(max_pipes)
    }

    pub fn with_budget(max_pipes: usize) -> ZOrderManager {
        ZOrderManager {
            max_pipes: max_pipes.min(MAX_PIPES_PER_MIXER),
            slots: Mutex::new([0; NUM_MIXERS]),
        }
    }

    pub fn max_pipes(&self) -> usize {
        self.max_pipes
    }

    /// Claims the lowest free z-order on `mixer`.
    pub fn get_z(&self, mixer: Mixer) -> OverlayResult<ZOrder> {
        let mut slots = self.slots.lock().unwrap();
        let used = &mut slots[mixer.fb_index()];
        for z in 0..self.max_pipes {
            let bit = 1u8 << z;
            if *used & bit == 0 {
                *used |= bit;
                debug!("{}: allocated z-order {}", mixer, z);
                return Ok(z as ZOrder);
            }
        }
        warn!("{}: all {} pipes are in use", mixer, self.max_pipes);
        Err(OverlayError::NoPipe(mixer))
    }

    /// Returns `z` to the pool of `mixer`.
    ///
    /// Releasing a slot that is not held is a scheduler bug: debug builds panic, release builds
    /// log it and leave the table untouched.
    pub fn dec_z(&self, mixer: Mixer, z: ZOrder) {
        let mut slots = self.slots.lock().unwrap();
        let used = &mut slots[mixer.fb_index()];
        let bit = 1u8.checked_shl(z).unwrap_or(0);
        let held = (z as usize) < self.max_pipes && *used & bit != 0;
        if !held {
            error!("{}: z-order {} released while not allocated", mixer, z);
        }
        debug_assert!(held, "double release of z-order {} on {}", z, mixer);
        if held {
            *used &= !bit;
            debug!("{}: released z-order {}", mixer, z);
        }
    }

    /// Number of slots currently held on `mixer`.
    pub fn in_use(&self, mixer: Mixer) -> usize {
        self.slots.lock().unwrap()[mixer.fb_index()].count_ones() as usize
    }

    /// Slots still available on `mixer`.
    pub fn available(&self, mixer: Mixer) -> usize {
        self.max_pipes - self.in_use(mixer)
    }

    pub fn is_held(&self, mixer: Mixer, z: ZOrder) -> bool {
        let bit = 1u8.checked_shl(z).unwrap_or(0);
        self.slots.lock().unwrap()[mixer.fb_index()] & bit != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_free_slot_first() {
        let zm = ZOrderManager::new(false);
        assert_eq!(zm.get_z(Mixer::Primary).unwrap(), 0);
        assert_eq!(zm.get_z(Mixer::Primary).unwrap(), 1);
        zm.dec_z(Mixer::Primary, 0);
        assert_eq!(zm.get_z(Mixer::Primary).unwrap(), 0);
    }

    #[test]
    fn budget_is_per_mixer() {
        let zm = ZOrderManager::new(false);
        assert_eq!(zm.max_pipes(), 2);
        zm.get_z(Mixer::Primary).unwrap();
        zm.get_z(Mixer::Primary).unwrap();
        match zm.get_z(Mixer::Primary) {
            Err(OverlayError::NoPipe(Mixer::Primary)) => (),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(zm.get_z(Mixer::External).unwrap(), 0);
        assert_eq!(zm.available(Mixer::External), 1);
    }

    #[test]
    fn true_mirror_adds_a_pipe() {
        let zm = ZOrderManager::new(true);
        assert_eq!(zm.max_pipes(), 3);
        for z in 0..3 {
            assert_eq!(zm.get_z(Mixer::External).unwrap(), z);
        }
        assert!(zm.get_z(Mixer::External).is_err());
    }

    #[test]
    fn held_slots_are_unique_and_pool_restores() {
        let zm = ZOrderManager::with_budget(4);
        // An interleaving of acquires and releases that never exceeds the budget.
        let script: &[Option<usize>] = &[
            None,
            None,
            Some(0),
            None,
            None,
            Some(1),
            None,
            Some(0),
            Some(0),
            None,
        ];
        let mut held: Vec<ZOrder> = Vec::new();
        for step in script {
            match step {
                None => {
                    let z = zm.get_z(Mixer::Primary).unwrap();
                    assert!(!held.contains(&z));
                    held.push(z);
                }
                Some(i) => {
                    let z = held.remove(*i);
                    zm.dec_z(Mixer::Primary, z);
                }
            }
            assert_eq!(zm.in_use(Mixer::Primary), held.len());
        }
        for z in held.drain(..) {
            zm.dec_z(Mixer::Primary, z);
        }
        assert_eq!(zm.in_use(Mixer::Primary), 0);
        assert_eq!(zm.available(Mixer::Primary), 4);
    }

    #[test]
    #[should_panic]
    fn double_release_is_a_bug() {
        let zm = ZOrderManager::new(false);
        let z = zm.get_z(Mixer::Primary).unwrap();
        zm.dec_z(Mixer::Primary, z);
        zm.dec_z(Mixer::Primary, z);
    }
}

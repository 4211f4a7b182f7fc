//! Mapped-region primitive shared by the reader and writer sides.

use crate::layout::*;
use crate::{BridgeError, BridgeResult};
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

/// A mapped bridge region. Field access goes through explicit little-endian
/// codecs; the `state_flag` and the command seqlock word are accessed through
/// atomic references into the mapping.
#[derive(Debug)]
pub(crate) struct Region {
    mmap: MmapMut,
}

impl Region {
    /// Map an existing region file (consumer side).
    pub(crate) fn open(path: &Path) -> BridgeResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let region = Self { mmap };
        region.check_size()?;
        Ok(region)
    }

    /// Create (or truncate) and map the region file (producer side).
    pub(crate) fn create(path: &Path) -> BridgeResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        file.set_len(REGION_SIZE as u64)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let region = Self { mmap };
        region.check_size()?;
        Ok(region)
    }

    fn check_size(&self) -> BridgeResult<()> {
        if self.mmap.len() < REGION_SIZE {
            return Err(BridgeError::RegionTooSmall {
                required: REGION_SIZE,
                actual: self.mmap.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn verify_magic(&self) -> BridgeResult<()> {
        let actual = u64::from_le_bytes(self.mmap[OFF_MAGIC..OFF_MAGIC + 8].try_into().unwrap());
        if actual != BRIDGE_MAGIC {
            return Err(BridgeError::BadMagic {
                expected: BRIDGE_MAGIC,
                actual,
            });
        }
        Ok(())
    }

    pub(crate) fn stamp_magic(&mut self) {
        self.mmap[OFF_MAGIC..OFF_MAGIC + 8].copy_from_slice(&BRIDGE_MAGIC.to_le_bytes());
    }

    // -----------------------------------------------------------------------
    // Header fields
    // -----------------------------------------------------------------------

    /// Atomic view of `state_flag`. The mapping is page-aligned and the flag
    /// sits at a 4-byte-aligned offset, so the reference is valid.
    pub(crate) fn state_flag(&self) -> &AtomicU32 {
        unsafe { &*(self.mmap.as_ptr().add(OFF_STATE_FLAG) as *const AtomicU32) }
    }

    pub(crate) fn frame_id(&self) -> u64 {
        u64::from_le_bytes(self.mmap[OFF_FRAME_ID..OFF_FRAME_ID + 8].try_into().unwrap())
    }

    pub(crate) fn set_frame_id(&mut self, id: u64) {
        self.mmap[OFF_FRAME_ID..OFF_FRAME_ID + 8].copy_from_slice(&id.to_le_bytes());
    }

    pub(crate) fn sim_time(&self) -> f64 {
        f64::from_le_bytes(self.mmap[OFF_SIM_TIME..OFF_SIM_TIME + 8].try_into().unwrap())
    }

    pub(crate) fn set_sim_time(&mut self, t: f64) {
        self.mmap[OFF_SIM_TIME..OFF_SIM_TIME + 8].copy_from_slice(&t.to_le_bytes());
    }

    pub(crate) fn num_points(&self) -> u32 {
        u32::from_le_bytes(self.mmap[OFF_NUM_POINTS..OFF_NUM_POINTS + 4].try_into().unwrap())
    }

    pub(crate) fn set_num_points(&mut self, n: u32) {
        self.mmap[OFF_NUM_POINTS..OFF_NUM_POINTS + 4].copy_from_slice(&n.to_le_bytes());
    }

    // -----------------------------------------------------------------------
    // Payload sections
    // -----------------------------------------------------------------------

    pub(crate) fn radar_slot(&mut self, idx: usize) -> &mut [u8] {
        let start = RADAR_OFFSET + idx * POINT_SIZE;
        &mut self.mmap[start..start + POINT_SIZE]
    }

    pub(crate) fn read_radar(&self, count: usize) -> Vec<SimRadarPoint> {
        let count = count.min(RADAR_CAPACITY);
        (0..count)
            .map(|i| {
                let start = RADAR_OFFSET + i * POINT_SIZE;
                SimRadarPoint::read_from(&self.mmap[start..start + POINT_SIZE])
            })
            .collect()
    }

    pub(crate) fn video(&self) -> &[u8] {
        &self.mmap[VIDEO_OFFSET..VIDEO_OFFSET + VIDEO_SIZE]
    }

    pub(crate) fn video_mut(&mut self) -> &mut [u8] {
        &mut self.mmap[VIDEO_OFFSET..VIDEO_OFFSET + VIDEO_SIZE]
    }

    // -----------------------------------------------------------------------
    // Command block seqlock
    // -----------------------------------------------------------------------

    fn command_seq(&self) -> &AtomicU32 {
        unsafe { &*(self.mmap.as_ptr().add(COMMAND_OFFSET + CMD_OFF_SEQ) as *const AtomicU32) }
    }

    /// Tear-free command handover: bump the sequence to odd, write the
    /// payload, bump to even with release so a reader never observes a
    /// half-written command.
    pub(crate) fn write_command(&mut self, cmd: &ControlCommand) {
        let seq = self.command_seq();
        let s = seq.load(Ordering::Relaxed);
        seq.store(s.wrapping_add(1), Ordering::Release);
        let block = &mut self.mmap[COMMAND_OFFSET..COMMAND_OFFSET + COMMAND_SIZE];
        cmd.write_payload(block);
        self.command_seq().store(s.wrapping_add(2), Ordering::Release);
    }

    /// Seqlock read: retry while the writer is mid-update.
    pub(crate) fn read_command(&self) -> ControlCommand {
        loop {
            let s1 = self.command_seq().load(Ordering::Acquire);
            if s1 & 1 != 0 {
                std::hint::spin_loop();
                continue;
            }
            let block = &self.mmap[COMMAND_OFFSET..COMMAND_OFFSET + COMMAND_SIZE];
            let cmd = ControlCommand::read_payload(block);
            let s2 = self.command_seq().load(Ordering::Acquire);
            if s1 == s2 {
                return cmd;
            }
        }
    }
}

// The region is only ever mutated through &mut self or through the atomic
// references above; the handshake protocol serializes payload access.
unsafe impl Send for Region {}

/// Standard-speed slot intervals, in quarter-microsecond ticks.
///
/// Naming follows the classic Maxim interval table: A/B bound a write-1
/// slot, C/D a write-0 slot, A/E/F the read slot (drive, wait, sample,
/// recover), G/H/I/J the reset sequence.
pub(crate) struct Timing {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
    pub e: u32,
    pub f: u32,
    pub g: u32,
    pub h: u32,
    pub i: u32,
    pub j: u32,
}

pub(crate) const STANDARD: Timing = Timing {
    a: 6 * 4,
    b: 64 * 4,
    c: 60 * 4,
    d: 10 * 4,
    e: 9 * 4,
    f: 55 * 4,
    g: 0,
    h: 480 * 4,
    i: 70 * 4,
    j: 410 * 4,
};

/// Nanoseconds per tick.
pub(crate) const TICK_NS: u32 = 250;

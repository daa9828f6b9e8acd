/// Memory size representation supporting common units.
///
/// This enum provides a convenient way to specify memory sizes in bytes,
/// kilobytes, megabytes, gigabytes, or terabytes. All units use binary
/// (base-2) multipliers (1 KB = 1024 bytes).
///
/// # Examples
///
/// ```
/// use thpfrag_core::util::Size;
///
/// let size = Size::MB(2);
/// assert_eq!(size.bytes(), 2 * 1024 * 1024);
///
/// let reservation = Size::TB(32);
/// assert_eq!(reservation.bytes(), 32 * (1 << 40));
/// ```
#[derive(Clone, Copy, Debug)]
pub enum Size {
    /// Size in bytes
    B(usize),
    /// Size in kilobytes (1 KB = 1024 bytes)
    KB(usize),
    /// Size in megabytes (1 MB = 1024 KB)
    MB(usize),
    /// Size in gigabytes (1 GB = 1024 MB)
    GB(usize),
    /// Size in terabytes (1 TB = 1024 GB)
    TB(usize),
}

impl Size {
    /// Converts this size to bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use thpfrag_core::util::Size;
    ///
    /// assert_eq!(Size::B(100).bytes(), 100);
    /// assert_eq!(Size::KB(1).bytes(), 1024);
    /// assert_eq!(Size::MB(1).bytes(), 1048576);
    /// assert_eq!(Size::GB(1).bytes(), 1073741824);
    /// ```
    pub const fn bytes(&self) -> usize {
        match self {
            Size::B(bytes) => *bytes,
            Size::KB(kb) => *kb * (1 << 10),
            Size::MB(mb) => *mb * (1 << 20),
            Size::GB(gb) => *gb * (1 << 30),
            Size::TB(tb) => *tb * (1 << 40),
        }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Size::B(bytes) => write!(f, "{} B", bytes),
            Size::KB(kb) => write!(f, "{} KB", kb),
            Size::MB(mb) => write!(f, "{} MB", mb),
            Size::GB(gb) => write!(f, "{} GB", gb),
            Size::TB(tb) => write!(f, "{} TB", tb),
        }
    }
}

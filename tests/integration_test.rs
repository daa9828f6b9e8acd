use thpfrag::memory::{Reservation, Residency, page_size, pmd_size};
use thpfrag::thp::{ClaimSlot, RETRY_BUDGET, ThpClaimer, allocate, fragment};
use thpfrag::util::Size;

#[test]
fn test_residency_idempotent_on_populated_page() -> anyhow::Result<()> {
    let len = page_size();
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_POPULATE,
            -1,
            0,
        )
    };
    assert_ne!(ptr, libc::MAP_FAILED);
    let ptr = ptr as *mut u8;
    unsafe { std::ptr::write_volatile(ptr, 1) };

    let mut residency = Residency::new()?;
    assert!(residency.is_resident(ptr)?);
    assert!(residency.is_resident(ptr)?);

    unsafe { libc::munmap(ptr as *mut libc::c_void, len) };
    Ok(())
}

#[test]
fn test_reserved_page_not_resident() -> anyhow::Result<()> {
    let reservation = Reservation::reserve(Size::MB(4), Size::B(page_size()))?;
    let probe = reservation.aligned_start(page_size());

    let mut residency = Residency::new()?;
    assert!(!residency.is_resident(probe)?);
    assert!(!residency.is_resident(probe)?);

    reservation.dealloc();
    Ok(())
}

#[test]
fn test_reservation_halves_to_fit() -> anyhow::Result<()> {
    // 2^62 bytes can never be mapped on x86_64; the reservation must halve
    // its way down instead of failing outright.
    let reservation = Reservation::reserve(Size::B(1 << 62), Size::MB(2))?;
    assert!(reservation.len >= Size::MB(2).bytes());
    assert!(reservation.len < (1 << 62));

    let start = reservation.aligned_start(Size::MB(2).bytes());
    assert!((start as usize).is_multiple_of(Size::MB(2).bytes()));
    assert!(start as usize >= reservation.ptr as usize);
    assert!((start as usize) < reservation.ptr as usize + reservation.len);

    reservation.dealloc();
    Ok(())
}

#[test]
fn test_reservation_floor_is_terminal() {
    // Nothing between 2^62 and the floor is mappable, so the halving loop
    // must give up with the OS error instead of spinning.
    let result = Reservation::reserve(Size::B(1 << 62), Size::B(1 << 61));
    assert!(result.is_err());
}

#[test]
fn test_disable_collapse_on_empty_range() -> anyhow::Result<()> {
    let reservation = Reservation::reserve(Size::MB(4), Size::B(page_size()))?;
    let start = reservation.aligned_start(page_size());

    let mut claimer = ThpClaimer::new()?;
    claimer.disable_collapse(start, 0)?;

    reservation.dealloc();
    Ok(())
}

/// Full claim-and-shatter pass over 1 GiB. Needs a THP-enabled kernel with
/// enough free memory to fault in 512 huge pages; run manually with
/// `cargo test -- --ignored`.
#[test]
#[ignore]
fn test_claim_and_shatter_one_gb() -> anyhow::Result<()> {
    env_logger::init();
    let page = page_size();
    let pmd = pmd_size();

    let reservation = Reservation::reserve(Size::GB(1), Size::B(pmd))?;
    let start = reservation.aligned_start(pmd);
    let mut claimer = ThpClaimer::new()?;
    let allocation = allocate(&mut claimer, start, reservation.end(), RETRY_BUDGET, None)?;

    assert!(allocation.range.slot_count() <= Size::GB(1).bytes() / pmd);
    let mut residency = Residency::new()?;
    for slot in allocation.range.slots() {
        assert!(residency.is_resident(slot.wrapping_add(pmd - page))?);
    }

    fragment(&allocation.range, page, None)?;
    for slot in allocation.range.slots() {
        assert!(residency.is_resident(slot)?);
        assert!(!residency.is_resident(slot.wrapping_add(page))?);
        assert!(!residency.is_resident(slot.wrapping_add(pmd - page))?);
    }

    reservation.dealloc();
    Ok(())
}

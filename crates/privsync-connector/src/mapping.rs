//! Vendor permission mapping
//!
//! Fixed lookup from PostgreSQL privilege names (as reported by `aclexplode`)
//! to [`Privilege`]. Names absent from the table are dropped.

use privsync_core::Privilege;

/// Permission name reported for schema ownership.
pub const OWNER_PERMISSION: &str = "OWNER";

/// Every vendor permission that maps to a privilege.
pub const VENDOR_PERMISSIONS: &[(&str, Privilege)] = &[
    ("SELECT", Privilege::Select),
    ("INSERT", Privilege::Insert),
    ("UPDATE", Privilege::Update),
    ("DELETE", Privilege::Delete),
    ("EXECUTE", Privilege::Execute),
    ("CONNECT", Privilege::Connect),
    ("CREATE", Privilege::Alter),
    (OWNER_PERMISSION, Privilege::Control),
];

/// Map a vendor permission name. Case-insensitive.
#[must_use]
pub fn map_vendor_permission(name: &str) -> Option<Privilege> {
    let name = name.trim();
    VENDOR_PERMISSIONS
        .iter()
        .find(|(vendor, _)| vendor.eq_ignore_ascii_case(name))
        .map(|(_, privilege)| *privilege)
}

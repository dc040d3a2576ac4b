// Helper for generating UUIDv7 (timestamp-sortable UUIDs)
//
// Session rows are ordered by creation time, so their ids are generated
// app-side as UUIDv7. Users, roles and permissions keep PG's
// gen_random_uuid() (v4).

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Generate a new random UUIDv4.
pub fn uuidv4() -> Uuid {
    Uuid::new_v4()
}

/// Whether `s` parses as a UUID.
pub fn is_uuid(s: &str) -> bool {
    Uuid::parse_str(s).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuidv7_is_valid() {
        let id = uuidv7();
        assert_eq!(id.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn uuidv7_is_monotonic() {
        let a = uuidv7();
        let b = uuidv7();
        assert!(b >= a);
    }

    #[test]
    fn is_uuid_rejects_garbage() {
        assert!(is_uuid(&uuidv4().to_string()));
        assert!(!is_uuid("not-a-uuid"));
        assert!(!is_uuid(""));
    }
}

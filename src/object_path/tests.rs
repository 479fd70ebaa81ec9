use super::{ObjectPath, ObjectPathBuf};

#[test]
fn legal_paths() {
    assert!(ObjectPath::new(b"").is_err());
    assert!(ObjectPath::new(b"a").is_err());
    assert!(ObjectPath::new(b"/").is_ok());
    assert!(ObjectPath::new(b"/a").is_ok());
    assert!(ObjectPath::new(b"//").is_err());
    assert!(ObjectPath::new(b"/com/example").is_ok());
    assert!(ObjectPath::new(b"/com/example/").is_err());
    assert!(ObjectPath::new(b"/com/_example1").is_ok());
    assert!(ObjectPath::new(b"/com/ex-ample").is_err());
    assert!(ObjectPath::new(b"/com/ex ample").is_err());
}

#[test]
fn iterate_elements() {
    let path = ObjectPath::new(b"/org/freedesktop/DBus").unwrap();
    assert_eq!(
        path.iter().collect::<Vec<_>>(),
        ["org", "freedesktop", "DBus"]
    );
    assert_eq!(
        path.iter().rev().collect::<Vec<_>>(),
        ["DBus", "freedesktop", "org"]
    );
    assert_eq!(ObjectPath::ROOT.iter().count(), 0);
}

#[test]
fn owned_round_trip() {
    let path = ObjectPath::new(b"/org/freedesktop/DBus").unwrap();
    let owned = ObjectPathBuf::from(path);
    assert_eq!(owned.as_path(), path);
    assert_eq!(owned, *path);
}

use super::ObjectPath;

#[test]
fn valid_object_paths() {
    for path in [
        "/",
        "/a",
        "/foo",
        "/foo/bar",
        "/org/freedesktop/DBus",
        "/se/tedro/JapaneseDictionary",
        "/com/example/MusicPlayer1",
        "/a/b/c/d/e/f",
        "/path/with_underscore",
        "/_",
        "/0/1/2",
    ] {
        assert!(ObjectPath::new(path).is_ok(), "{path}");
    }
}

#[test]
fn invalid_object_paths() {
    for path in [
        "",
        "foo",
        "foo/bar",
        "/foo/",
        "/foo//bar",
        "//",
        "/foo/bar/",
        "/foo.bar",
        "/foo-bar",
        "/foo bar",
        "/föö",
    ] {
        assert!(ObjectPath::new(path).is_err(), "{path}");
    }
}

#[test]
fn display_and_debug() {
    let path = ObjectPath::new("/org/freedesktop/DBus").unwrap();
    assert_eq!(path.to_string(), "/org/freedesktop/DBus");
    assert_eq!(format!("{path:?}"), "\"/org/freedesktop/DBus\"");
}

#[test]
fn boxed_round_trip() {
    let path = ObjectPath::new("/org/freedesktop/DBus").unwrap();
    let boxed: Box<ObjectPath> = path.into();
    assert_eq!(&*boxed, path);
    let cloned = boxed.clone();
    assert_eq!(&*cloned, path);
}

#[test]
fn root_path() {
    assert_eq!(ObjectPath::ROOT.as_str(), "/");
    assert_eq!(ObjectPath::ROOT, ObjectPath::new("/").unwrap());
}

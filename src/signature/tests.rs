use super::{Signature, SignatureBuf, SignatureErrorKind, MAX_SIGNATURE};

use SignatureErrorKind::*;

macro_rules! test {
    ($input:expr, $expected:pat) => {{
        let actual = Signature::new($input).map_err(|e| e.kind);

        assert!(
            matches!(actual, $expected),
            "{actual:?} does not match {}",
            stringify!($expected)
        );
    }};
}

#[test]
fn signature_grammar() {
    test!(b"", Ok(..));
    test!(b"sss", Ok(..));
    test!(b"i", Ok(..));
    test!(b"b", Ok(..));
    test!(b"ai", Ok(..));
    test!(b"(i)", Ok(..));
    test!(b"a{sv}", Ok(..));
    test!(b"a(yv)", Ok(..));
    test!(b"aa{s(iu)}", Ok(..));
    test!(b"w", Err(UnknownTypeCode(..)));
    test!(b"a", Err(MissingArrayElementType));
    test!(b"aaaaaa", Err(MissingArrayElementType));
    test!(b"ii(ii)a", Err(MissingArrayElementType));
    test!(b"ia", Err(MissingArrayElementType));
    test!(b")", Err(StructEndedButNotStarted));
    test!(b"}", Err(DictEndedButNotStarted));
    test!(b"i)", Err(StructEndedButNotStarted));
    test!(b"a)", Err(MissingArrayElementType));
    test!(b"(", Err(StructStartedButNotEnded));
    test!(b"(i", Err(StructStartedButNotEnded));
    test!(b"(iiiii", Err(StructStartedButNotEnded));
    test!(b"(ai", Err(StructStartedButNotEnded));
    test!(b"()", Err(StructHasNoFields));
    test!(b"(())", Err(StructHasNoFields));
    test!(b"a()", Err(StructHasNoFields));
    test!(b"i()", Err(StructHasNoFields));
    test!(b"()i", Err(StructHasNoFields));
    test!(b"(a)", Err(MissingArrayElementType));
    test!(b"a{ia}", Err(MissingArrayElementType));
    test!(b"a{}", Err(DictEntryHasNoFields));
    test!(b"a{aii}", Err(DictKeyMustBeBasicType));
    test!(b"a{vi}", Err(DictKeyMustBeBasicType));
    test!(b" ", Err(UnknownTypeCode(..)));
    test!(b"not a valid signature", Err(UnknownTypeCode(..)));
    test!(b"123", Err(UnknownTypeCode(..)));
    test!(b".", Err(UnknownTypeCode(..)));
    test!(b"a{(ii)i}", Err(DictKeyMustBeBasicType));
    test!(b"a{i}", Err(DictEntryHasOnlyOneField));
    test!(b"{is}", Err(DictEntryNotInsideArray));
    test!(b"a{isi}", Err(DictEntryHasTooManyFields));
}

#[test]
fn array_recursion_limits() {
    test!(b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaai", Ok(..));
    test!(
        b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaai",
        Err(ExceededMaximumArrayRecursion)
    );
}

#[test]
fn length_limit() {
    let long = vec![b'i'; MAX_SIGNATURE];
    test!(&long, Ok(..));

    let too_long = vec![b'i'; MAX_SIGNATURE + 1];
    test!(&too_long, Err(SignatureTooLong));
}

#[test]
fn iterate_complete_types() {
    let sig = Signature::new(b"ia(yv)a{sv}(i(ss))v").unwrap();
    let types = sig.iter().map(|s| s.as_str()).collect::<Vec<_>>();
    assert_eq!(types, ["i", "a(yv)", "a{sv}", "(i(ss))", "v"]);

    assert_eq!(Signature::EMPTY.iter().count(), 0);
}

#[test]
fn round_trip_through_buf() {
    for sig in [&b"i"[..], b"a{sv}", b"(ii)ai", b""] {
        let parsed = Signature::new(sig).unwrap();
        let owned = SignatureBuf::from(parsed);
        assert_eq!(owned.as_sig(), parsed);
        assert_eq!(owned.as_str().as_bytes(), sig);
    }
}

#[test]
fn extend_respects_cap() {
    let mut buf = SignatureBuf::empty();

    for _ in 0..MAX_SIGNATURE {
        buf.extend(Signature::new(b"y").unwrap()).unwrap();
    }

    assert!(buf.extend(Signature::new(b"y").unwrap()).is_err());
}

#[test]
fn alignments() {
    for (sig, align) in [
        (&b"y"[..], 1),
        (b"g", 1),
        (b"v", 1),
        (b"n", 2),
        (b"q", 2),
        (b"b", 4),
        (b"i", 4),
        (b"u", 4),
        (b"h", 4),
        (b"s", 4),
        (b"o", 4),
        (b"ai", 4),
        (b"x", 8),
        (b"t", 8),
        (b"d", 8),
        (b"(y)", 8),
    ] {
        assert_eq!(Signature::new(sig).unwrap().alignment(), align, "{sig:?}");
    }
}

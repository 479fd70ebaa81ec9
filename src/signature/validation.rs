use crate::proto::Type;

use super::{SignatureError, SignatureErrorKind, MAX_CONTAINER_DEPTH, MAX_DEPTH, MAX_SIGNATURE};

// Container stack slots encoded in a byte so validation can stay const:
// low nibble is the container kind, high nibble a field counter saturating
// at 3 (only 0, 1, 2 and "more" matter for dict entries).
const KIND_ARRAY: u8 = 1;
const KIND_STRUCT: u8 = 2;
const KIND_DICT: u8 = 3;

const fn kind(slot: u8) -> u8 {
    slot & 0x0f
}

const fn count(slot: u8) -> u8 {
    slot >> 4
}

const fn bump(slot: u8) -> u8 {
    if count(slot) == 3 {
        slot
    } else {
        slot + 0x10
    }
}

/// Validate a full signature: a sequence of single complete types.
pub(super) const fn validate(bytes: &[u8]) -> Result<(), SignatureError> {
    use SignatureErrorKind::*;

    if bytes.len() > MAX_SIGNATURE {
        return Err(SignatureError::new(SignatureTooLong));
    }

    let mut stack = [0u8; MAX_DEPTH];
    let mut depth = 0usize;
    let mut arrays = 0usize;
    let mut structs = 0usize;
    let mut n = 0usize;

    while n < bytes.len() {
        let b = bytes[n];
        n += 1;
        let t = Type::new(b);

        let mut is_basic = match t {
            Type::BYTE
            | Type::BOOLEAN
            | Type::INT16
            | Type::UINT16
            | Type::INT32
            | Type::UINT32
            | Type::INT64
            | Type::UINT64
            | Type::DOUBLE
            | Type::STRING
            | Type::OBJECT_PATH
            | Type::SIGNATURE
            | Type::UNIX_FD => true,
            // A variant is a single complete type but not a basic one.
            Type::VARIANT => false,
            Type::ARRAY => {
                if depth == MAX_DEPTH {
                    return Err(SignatureError::new(ExceededMaximumDepth));
                }

                if arrays == MAX_CONTAINER_DEPTH {
                    return Err(SignatureError::new(ExceededMaximumArrayRecursion));
                }

                stack[depth] = KIND_ARRAY;
                depth += 1;
                arrays += 1;
                continue;
            }
            Type::OPEN_PAREN => {
                if depth == MAX_DEPTH {
                    return Err(SignatureError::new(ExceededMaximumDepth));
                }

                if structs == MAX_CONTAINER_DEPTH {
                    return Err(SignatureError::new(ExceededMaximumStructRecursion));
                }

                stack[depth] = KIND_STRUCT;
                depth += 1;
                structs += 1;
                continue;
            }
            Type::CLOSE_PAREN => {
                if depth == 0 {
                    return Err(SignatureError::new(StructEndedButNotStarted));
                }

                depth -= 1;
                let slot = stack[depth];

                match kind(slot) {
                    KIND_STRUCT => {}
                    KIND_ARRAY => {
                        return Err(SignatureError::new(MissingArrayElementType));
                    }
                    _ => {
                        return Err(SignatureError::new(StructEndedButNotStarted));
                    }
                }

                if count(slot) == 0 {
                    return Err(SignatureError::new(StructHasNoFields));
                }

                structs -= 1;
                false
            }
            Type::OPEN_BRACE => {
                if depth == MAX_DEPTH {
                    return Err(SignatureError::new(ExceededMaximumDepth));
                }

                stack[depth] = KIND_DICT;
                depth += 1;
                continue;
            }
            Type::CLOSE_BRACE => {
                if depth == 0 {
                    return Err(SignatureError::new(DictEndedButNotStarted));
                }

                depth -= 1;
                let slot = stack[depth];

                match kind(slot) {
                    KIND_DICT => {}
                    KIND_ARRAY => {
                        return Err(SignatureError::new(MissingArrayElementType));
                    }
                    _ => {
                        return Err(SignatureError::new(DictEndedButNotStarted));
                    }
                }

                match count(slot) {
                    0 => {
                        return Err(SignatureError::new(DictEntryHasNoFields));
                    }
                    1 => {
                        return Err(SignatureError::new(DictEntryHasOnlyOneField));
                    }
                    2 => {}
                    _ => {
                        return Err(SignatureError::new(DictEntryHasTooManyFields));
                    }
                }

                if depth == 0 || kind(stack[depth - 1]) != KIND_ARRAY {
                    return Err(SignatureError::new(DictEntryNotInsideArray));
                }

                false
            }
            t => return Err(SignatureError::new(UnknownTypeCode(t))),
        };

        // The element just completed also completes every array directly
        // above it on the stack.
        while depth > 0 && kind(stack[depth - 1]) == KIND_ARRAY {
            depth -= 1;
            arrays -= 1;
            is_basic = false;
        }

        if depth > 0 {
            let slot = stack[depth - 1];

            if kind(slot) == KIND_DICT && count(slot) == 0 && !is_basic {
                return Err(SignatureError::new(DictKeyMustBeBasicType));
            }

            stack[depth - 1] = bump(slot);
        }
    }

    if depth > 0 {
        return Err(match kind(stack[depth - 1]) {
            KIND_ARRAY => SignatureError::new(MissingArrayElementType),
            KIND_STRUCT => SignatureError::new(StructStartedButNotEnded),
            _ => SignatureError::new(DictStartedButNotEnded),
        });
    }

    Ok(())
}

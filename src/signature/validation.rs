use crate::protocol::Type;

use super::{SignatureError, SignatureErrorKind, MAX_CONTAINER_DEPTH, MAX_DEPTH};

const NONE: u8 = 0;
const ARRAY: u8 = 1;
const STRUCT: u8 = 2;
const DICT: u8 = 3;

/// Validate a signature.
///
/// Each stack slot tracks the kind of the open container and the number of
/// complete types seen directly inside it so far.
pub(crate) const fn validate(bytes: &[u8]) -> Result<(), SignatureError> {
    use SignatureErrorKind::*;

    if bytes.len() > u8::MAX as usize {
        return Err(SignatureError::new(SignatureTooLong));
    }

    let mut kinds = [NONE; MAX_DEPTH];
    let mut counts = [0u8; MAX_DEPTH];
    let mut sp = 0usize;

    let mut arrays = 0;
    let mut structs = 0;
    let mut n = 0;

    while n < bytes.len() {
        let t = Type(bytes[n]);
        n += 1;

        let mut is_basic = match t {
            Type::BYTE => true,
            Type::BOOLEAN => true,
            Type::INT16 => true,
            Type::UINT16 => true,
            Type::INT32 => true,
            Type::UINT32 => true,
            Type::INT64 => true,
            Type::UINT64 => true,
            Type::DOUBLE => true,
            Type::STRING => true,
            Type::OBJECT_PATH => true,
            Type::SIGNATURE => true,
            Type::UNIX_FD => true,
            Type::VARIANT => false,
            Type::ARRAY => {
                if sp == MAX_DEPTH || arrays == MAX_CONTAINER_DEPTH {
                    return Err(SignatureError::new(ExceededMaximumArrayRecursion));
                }

                kinds[sp] = ARRAY;
                counts[sp] = 0;
                sp += 1;
                arrays += 1;
                continue;
            }
            Type::OPEN_PAREN => {
                if sp == MAX_DEPTH || structs == MAX_CONTAINER_DEPTH {
                    return Err(SignatureError::new(ExceededMaximumStructRecursion));
                }

                kinds[sp] = STRUCT;
                counts[sp] = 0;
                sp += 1;
                structs += 1;
                continue;
            }
            Type::CLOSE_PAREN => {
                if sp == 0 {
                    return Err(SignatureError::new(StructEndedButNotStarted));
                }

                sp -= 1;

                let fields = match kinds[sp] {
                    STRUCT => counts[sp],
                    ARRAY => return Err(SignatureError::new(MissingArrayElementType)),
                    _ => return Err(SignatureError::new(StructEndedButNotStarted)),
                };

                if fields == 0 {
                    return Err(SignatureError::new(StructHasNoFields));
                }

                structs -= 1;
                false
            }
            Type::OPEN_BRACE => {
                if sp == MAX_DEPTH {
                    return Err(SignatureError::new(ExceededMaximumDictRecursion));
                }

                kinds[sp] = DICT;
                counts[sp] = 0;
                sp += 1;
                continue;
            }
            Type::CLOSE_BRACE => {
                if sp == 0 {
                    return Err(SignatureError::new(DictEndedButNotStarted));
                }

                sp -= 1;

                let fields = match kinds[sp] {
                    DICT => counts[sp],
                    ARRAY => return Err(SignatureError::new(MissingArrayElementType)),
                    _ => return Err(SignatureError::new(DictEndedButNotStarted)),
                };

                match fields {
                    0 => return Err(SignatureError::new(DictEntryHasNoFields)),
                    1 => return Err(SignatureError::new(DictEntryHasOnlyOneField)),
                    2 => {}
                    _ => return Err(SignatureError::new(DictEntryHasTooManyFields)),
                }

                if sp == 0 || kinds[sp - 1] != ARRAY {
                    return Err(SignatureError::new(DictEntryNotInsideArray));
                }

                false
            }
            t => return Err(SignatureError::new(UnknownTypeCode(t))),
        };

        // A complete type closes every array immediately containing it.
        while sp > 0 && kinds[sp - 1] == ARRAY {
            sp -= 1;
            arrays -= 1;
            is_basic = false;
        }

        if sp > 0 && kinds[sp - 1] == DICT && counts[sp - 1] == 0 && !is_basic {
            return Err(SignatureError::new(DictKeyMustBeBasicType));
        }

        if sp > 0 {
            counts[sp - 1] += 1;
        }
    }

    if sp > 0 {
        return match kinds[sp - 1] {
            ARRAY => Err(SignatureError::new(MissingArrayElementType)),
            STRUCT => Err(SignatureError::new(StructStartedButNotEnded)),
            _ => Err(SignatureError::new(DictStartedButNotEnded)),
        };
    }

    Ok(())
}

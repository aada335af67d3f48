use std::fmt;

// --- Tagged u64 Constants ---
// Bits 63..60 = tag  (4 bits, 16 possible types)
// Bits 59..0  = payload (60 bits)

const TAG_SHIFT: u32 = 60;
const PAYLOAD_MASK: u64 = (1u64 << 60) - 1; // 0x0FFF_FFFF_FFFF_FFFF

pub const TAG_INT: u64 = 0; // i60 inline (most common -> tag 0 for speed)
pub const TAG_NIL: u64 = 1;
pub const TAG_FALSE: u64 = 2;
pub const TAG_TRUE: u64 = 3;
pub const TAG_STRING: u64 = 4;
pub const TAG_MAP: u64 = 5;
pub const TAG_NUMBER: u64 = 6; // boxed f64
pub const TAG_NATIVE: u64 = 7;
pub const TAG_USERDATA: u64 = 8;
// 9-15 reserved

// i60 range constants
pub const I60_MIN: i64 = -(1i64 << 59);
pub const I60_MAX: i64 = (1i64 << 59) - 1;

// Compile-time guards
const _: () = assert!(TAG_INT < 16, "tag must fit in 4 bits");
const _: () = assert!(TAG_NIL < 16, "tag must fit in 4 bits");
const _: () = assert!(TAG_FALSE < 16, "tag must fit in 4 bits");
const _: () = assert!(TAG_TRUE < 16, "tag must fit in 4 bits");
const _: () = assert!(TAG_STRING < 16, "tag must fit in 4 bits");
const _: () = assert!(TAG_MAP < 16, "tag must fit in 4 bits");
const _: () = assert!(TAG_NUMBER < 16, "tag must fit in 4 bits");
const _: () = assert!(TAG_NATIVE < 16, "tag must fit in 4 bits");
const _: () = assert!(TAG_USERDATA < 16, "tag must fit in 4 bits");

/// A runtime value. Immediates (ints, nil, booleans) live in the payload,
/// everything else is a handle into one of the [`Heap`](crate::Heap) arenas.
///
/// Bitwise equality is identity: two userdata values are `==` only when they
/// point at the same heap slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(pub u64);

impl Value {
    // --- Constructors ---

    #[inline]
    pub fn int(val: i64) -> Self {
        Value((TAG_INT << TAG_SHIFT) | ((val as u64) & PAYLOAD_MASK))
    }

    #[inline]
    pub fn nil() -> Self {
        Value(TAG_NIL << TAG_SHIFT)
    }

    #[inline]
    pub fn bool(b: bool) -> Self {
        if b {
            Value(TAG_TRUE << TAG_SHIFT)
        } else {
            Value(TAG_FALSE << TAG_SHIFT)
        }
    }

    #[inline]
    pub fn string(handle: u32) -> Self {
        Value::make_obj(TAG_STRING, handle)
    }

    #[inline]
    pub fn map(handle: u32) -> Self {
        Value::make_obj(TAG_MAP, handle)
    }

    #[inline]
    pub fn number(handle: u32) -> Self {
        Value::make_obj(TAG_NUMBER, handle)
    }

    #[inline]
    pub fn native(handle: u32) -> Self {
        Value::make_obj(TAG_NATIVE, handle)
    }

    #[inline]
    pub fn userdata(handle: u32) -> Self {
        Value::make_obj(TAG_USERDATA, handle)
    }

    #[inline]
    fn make_obj(tag: u64, handle: u32) -> Self {
        Value((tag << TAG_SHIFT) | (handle as u64))
    }

    // --- Checkers ---

    #[inline]
    pub fn tag(&self) -> u64 {
        (self.0 >> TAG_SHIFT) & 0xF
    }

    #[inline]
    pub fn is_int(&self) -> bool {
        self.tag() == TAG_INT
    }

    #[inline]
    pub fn is_obj(&self) -> bool {
        self.tag() >= TAG_STRING
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        self.tag() == TAG_NIL
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        let t = self.tag();
        t == TAG_FALSE || t == TAG_TRUE
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        self.tag() == TAG_STRING
    }

    #[inline]
    pub fn is_map(&self) -> bool {
        self.tag() == TAG_MAP
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        self.tag() == TAG_NUMBER
    }

    #[inline]
    pub fn is_native(&self) -> bool {
        self.tag() == TAG_NATIVE
    }

    #[inline]
    pub fn is_userdata(&self) -> bool {
        self.tag() == TAG_USERDATA
    }

    // --- Accessors ---

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        if self.tag() != TAG_INT {
            return None;
        }
        let raw = self.0 & PAYLOAD_MASK;
        // Sign-extend from bit 59
        let extended = if raw & (1u64 << 59) != 0 {
            raw | !PAYLOAD_MASK
        } else {
            raw
        };
        Some(extended as i64)
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        if self.tag() == TAG_TRUE {
            Some(true)
        } else if self.tag() == TAG_FALSE {
            Some(false)
        } else {
            None
        }
    }

    #[inline]
    pub fn true_val() -> Self {
        Value(TAG_TRUE << TAG_SHIFT)
    }

    #[inline]
    pub fn false_val() -> Self {
        Value(TAG_FALSE << TAG_SHIFT)
    }

    #[inline]
    pub fn is_falsey(&self) -> bool {
        self.is_nil() || (self.tag() == TAG_FALSE)
    }

    #[inline]
    pub fn as_handle(&self) -> Option<u32> {
        if self.is_obj() {
            Some((self.0 & 0xFFFFFFFF) as u32)
        } else {
            None
        }
    }

    /// Script-facing type name, as reported by `type(v)`.
    pub fn type_name(&self) -> &'static str {
        match self.tag() {
            TAG_INT | TAG_NUMBER => "number",
            TAG_NIL => "nil",
            TAG_FALSE | TAG_TRUE => "boolean",
            TAG_STRING => "string",
            TAG_MAP => "table",
            TAG_NATIVE => "function",
            TAG_USERDATA => "userdata",
            _ => "unknown",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::nil()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(i) = self.as_int() {
            write!(f, "Int({})", i)
        } else if self.is_nil() {
            write!(f, "Nil")
        } else if let Some(b) = self.as_bool() {
            write!(f, "Bool({})", b)
        } else if let Some(handle) = self.as_handle() {
            let kind = match self.tag() {
                TAG_STRING => "String",
                TAG_MAP => "Map",
                TAG_NUMBER => "Number",
                TAG_NATIVE => "NativeFn",
                TAG_USERDATA => "UserData",
                _ => return write!(f, "Unknown(Bits: {:x})", self.0),
            };
            write!(f, "{}({})", kind, handle)
        } else {
            write!(f, "Unknown(Bits: {:x})", self.0)
        }
    }
}

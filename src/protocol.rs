//! Low level details of the D-Bus wire protocol.

/// The protocol major version this implementation speaks.
pub(crate) const VERSION: u8 = 1;

/// The maximum length of an array (64MB).
pub(crate) const MAX_ARRAY_LENGTH: u32 = 1u32 << 26;

/// The maximum length of a message body (128MB).
pub(crate) const MAX_BODY_LENGTH: u32 = MAX_ARRAY_LENGTH * 2;

raw_enum! {
    /// The first byte of every message, declaring the byte order of the
    /// marshaled payload.
    #[repr(u8)]
    pub enum Endianness {
        /// Little endian.
        LITTLE = b'l',
        /// Big endian.
        BIG = b'B',
    }
}

raw_enum! {
    /// The type of a message.
    #[repr(u8)]
    pub(crate) enum MessageType {
        /// Method call. This message type may prompt a reply.
        METHOD_CALL = 1,
        /// Method reply with returned data.
        METHOD_RETURN = 2,
        /// Error reply. If the first argument exists and is a string, it is
        /// an error message.
        ERROR = 3,
        /// Signal emission.
        SIGNAL = 4,
    }
}

raw_set! {
    /// Flags inside of a D-Bus message.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_peer::protocol::Flags;
    ///
    /// let flags = Flags::EMPTY;
    /// assert!(!(flags & Flags::NO_REPLY_EXPECTED));
    ///
    /// let flags = Flags::EMPTY | Flags::NO_REPLY_EXPECTED;
    /// assert!(flags & Flags::NO_REPLY_EXPECTED);
    /// assert!(!(flags & Flags::NO_AUTO_START));
    /// ```
    #[repr(u8)]
    pub enum Flags {
        /// An empty set of flags.
        EMPTY = 0,
        /// This message does not expect a method return or error reply, even
        /// if it is of a type that can have one.
        NO_REPLY_EXPECTED = 1,
        /// The bus must not launch an owner for the destination name in
        /// response to this message.
        NO_AUTO_START = 2,
        /// The caller is prepared to wait for interactive authorization of
        /// the call, which might take considerable time.
        ALLOW_INTERACTIVE_AUTHORIZATION = 4,
    }
}

raw_enum! {
    /// The code of a header field.
    #[repr(u8)]
    pub(crate) enum HeaderField {
        /// The object to send a call to, or the object a signal is emitted
        /// from.
        PATH = 1,
        /// The interface to invoke a method call on, or that a signal is
        /// emitted from. Optional for method calls, required for signals.
        INTERFACE = 2,
        /// The member, either the method name or signal name.
        MEMBER = 3,
        /// The name of the error that occurred, for errors.
        ERROR_NAME = 4,
        /// The serial number of the message this message is a reply to.
        REPLY_SERIAL = 5,
        /// The name of the connection this message is intended for.
        DESTINATION = 6,
        /// Unique name of the sending connection, filled in by the bus.
        SENDER = 7,
        /// The signature of the message body. If omitted, the body must be
        /// empty.
        SIGNATURE = 8,
        /// The number of Unix file descriptors that accompany the message,
        /// transferred out-of-band. If omitted, none accompany it.
        UNIX_FDS = 9,
    }
}

raw_enum! {
    /// A type code inside of a signature.
    #[repr(u8)]
    pub(crate) enum Type {
        /// 8-bit unsigned integer.
        BYTE = b'y',
        /// Boolean value stored as a 32-bit integer, 0 is FALSE and 1 is
        /// TRUE.
        BOOLEAN = b'b',
        /// 16-bit signed integer.
        INT16 = b'n',
        /// 16-bit unsigned integer.
        UINT16 = b'q',
        /// 32-bit signed integer.
        INT32 = b'i',
        /// 32-bit unsigned integer.
        UINT32 = b'u',
        /// 64-bit signed integer.
        INT64 = b'x',
        /// 64-bit unsigned integer.
        UINT64 = b't',
        /// IEEE 754 double.
        DOUBLE = b'd',
        /// UTF-8 string, nul terminated on the wire.
        STRING = b's',
        /// Name of an object instance.
        OBJECT_PATH = b'o',
        /// A type signature.
        SIGNATURE = b'g',
        /// Array of a single complete type.
        ARRAY = b'a',
        /// Start of a struct.
        OPEN_PAREN = b'(',
        /// End of a struct.
        CLOSE_PAREN = b')',
        /// Variant type, the type of the value is part of the value itself.
        VARIANT = b'v',
        /// Start of a dict entry.
        OPEN_BRACE = b'{',
        /// End of a dict entry.
        CLOSE_BRACE = b'}',
        /// Unix file descriptor, an index into the out-of-band descriptor
        /// array.
        UNIX_FD = b'h',
    }
}

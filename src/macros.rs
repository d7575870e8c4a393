/// A transparent wrapper around a raw protocol value with named constants for
/// the values the protocol defines.
macro_rules! raw_enum {
    (
        $(#[doc = $doc:literal])*
        #[repr($repr:ty)]
        $vis:vis enum $name:ident {
            $(
                $(#[$($variant_meta:meta)*])*
                $variant:ident = $value:expr
            ),* $(,)?
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Clone, Copy, PartialEq, Eq)]
        #[repr(transparent)]
        $vis struct $name(pub(crate) $repr);

        impl $name {
            $(
                $(#[$($variant_meta)*])*
                $vis const $variant: Self = Self($value);
            )*
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match *self {
                    $(Self::$variant => f.write_str(stringify!($variant)),)*
                    Self(raw) => write!(f, "INVALID({raw})"),
                }
            }
        }
    }
}

/// Like [`raw_enum!`], but the values form a bit set and the type gets the
/// corresponding bit operators.
macro_rules! raw_set {
    (
        $(#[doc = $doc:literal])*
        #[repr($repr:ty)]
        $vis:vis enum $name:ident {
            $(
                $(#[$($variant_meta:meta)*])*
                $variant:ident = $value:expr
            ),* $(,)?
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Default, Clone, Copy, PartialEq, Eq)]
        #[repr(transparent)]
        $vis struct $name(pub(crate) $repr);

        impl $name {
            $(
                $(#[$($variant_meta)*])*
                $vis const $variant: Self = Self($value);
            )*
        }

        impl core::ops::BitOr for $name {
            type Output = Self;

            #[inline]
            fn bitor(self, rhs: Self) -> Self::Output {
                Self(self.0 | rhs.0)
            }
        }

        impl core::ops::BitAnd for $name {
            type Output = bool;

            #[inline]
            fn bitand(self, rhs: Self) -> Self::Output {
                self.0 & rhs.0 != 0
            }
        }

        impl core::ops::BitXor for $name {
            type Output = Self;

            #[inline]
            fn bitxor(self, rhs: Self) -> Self::Output {
                Self(self.0 ^ rhs.0)
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                struct Raw(&'static str);

                impl core::fmt::Debug for Raw {
                    #[inline]
                    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                        write!(f, "{}", self.0)
                    }
                }

                struct Bits($repr);

                impl core::fmt::Debug for Bits {
                    #[inline]
                    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                        write!(f, "{:b}", self.0)
                    }
                }

                let mut f = f.debug_set();

                let mut this = *self;

                $(
                    if this & Self::$variant {
                        f.entry(&Raw(stringify!($variant)));
                        this = this ^ Self::$variant;
                    }
                )*

                if this.0 != 0 {
                    f.entry(&Bits(this.0));
                }

                f.finish()
            }
        }
    }
}

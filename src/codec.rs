//! Fixed-size plain-data encoding.
//!
//! Heap arenas are byte buffers; the runtime never reinterprets raw memory.
//! The [`Plain`] trait is the bridge: a type that encodes to a fixed number
//! of little-endian bytes and decodes from the same. It stands in for the
//! "trivially copyable" requirement the one-sided operations place on the
//! values they move.
//!
//! Implementations are provided for the primitive integers, floats, `bool`,
//! `()`, and fixed-size arrays of `Plain` elements.

/// A value with a fixed-width, position-independent byte encoding.
///
/// `SIZE` must equal the number of bytes written by [`Plain::write_to`] and
/// consumed by [`Plain::read_from`]. Both methods panic if the buffer slice
/// is shorter than `SIZE`; callers always present exactly-sized cells.
pub trait Plain: Copy + Send + 'static {
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Writes the value into the first `SIZE` bytes of `buf`.
    fn write_to(&self, buf: &mut [u8]);

    /// Reads a value from the first `SIZE` bytes of `buf`.
    fn read_from(buf: &[u8]) -> Self;
}

macro_rules! plain_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Plain for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn write_to(&self, buf: &mut [u8]) {
                    buf[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                fn read_from(buf: &[u8]) -> Self {
                    let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                    bytes.copy_from_slice(&buf[..Self::SIZE]);
                    <$ty>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

plain_int!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

impl Plain for bool {
    const SIZE: usize = 1;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0] = u8::from(*self);
    }

    fn read_from(buf: &[u8]) -> Self {
        buf[0] != 0
    }
}

impl Plain for () {
    const SIZE: usize = 0;

    fn write_to(&self, _buf: &mut [u8]) {}

    fn read_from(_buf: &[u8]) -> Self {}
}

impl<T: Plain, const N: usize> Plain for [T; N] {
    const SIZE: usize = T::SIZE * N;

    fn write_to(&self, buf: &mut [u8]) {
        for (i, item) in self.iter().enumerate() {
            item.write_to(&mut buf[i * T::SIZE..]);
        }
    }

    fn read_from(buf: &[u8]) -> Self {
        std::array::from_fn(|i| T::read_from(&buf[i * T::SIZE..]))
    }
}

/// Encodes a value into a freshly allocated buffer of exactly `T::SIZE`.
#[must_use]
pub fn to_bytes<T: Plain>(value: &T) -> Vec<u8> {
    let mut buf = vec![0u8; T::SIZE];
    value.write_to(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_round_trip() {
        let mut buf = [0u8; 16];
        0x1234_5678_9abc_def0_u64.write_to(&mut buf);
        assert_eq!(u64::read_from(&buf), 0x1234_5678_9abc_def0);

        (-42i32).write_to(&mut buf);
        assert_eq!(i32::read_from(&buf), -42);
    }

    #[test]
    fn floats_round_trip() {
        let mut buf = [0u8; 8];
        core::f64::consts::PI.write_to(&mut buf);
        assert!((f64::read_from(&buf) - core::f64::consts::PI).abs() < f64::EPSILON);
    }

    #[test]
    fn arrays_round_trip() {
        let values = [1u16, 2, 3, 4];
        let mut buf = [0u8; 8];
        values.write_to(&mut buf);
        assert_eq!(<[u16; 4]>::read_from(&buf), values);
    }

    #[test]
    fn encoding_is_little_endian() {
        let buf = to_bytes(&0x0102_0304u32);
        assert_eq!(buf, vec![0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn unit_is_zero_sized() {
        assert_eq!(<() as Plain>::SIZE, 0);
        let buf = to_bytes(&());
        assert!(buf.is_empty());
    }
}

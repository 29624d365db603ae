/// Implements endian-explicit read helpers for primitive types on a medium.
///
/// Both byte orders are generated; partition schemes disagree on which one
/// the disk speaks.
#[macro_export]
macro_rules! medium_impl_primitive_reads {
    ($($ty:ty),+ $(,)?) => {
        $(
            paste::paste! {
                #[inline(always)]
                fn [<read_ $ty _le_at>](&mut self, offset: u64) -> MediumResult<$ty> {
                    let mut buf = [0u8; core::mem::size_of::<$ty>()];
                    self.read_at(offset, &mut buf)?;
                    Ok(<$ty>::from_le_bytes(buf))
                }

                #[inline(always)]
                fn [<read_ $ty _be_at>](&mut self, offset: u64) -> MediumResult<$ty> {
                    let mut buf = [0u8; core::mem::size_of::<$ty>()];
                    self.read_at(offset, &mut buf)?;
                    Ok(<$ty>::from_be_bytes(buf))
                }
            }
        )+
    };
}

//! Operator boilerplate for single-field numeric newtypes.
//!
//! ```rust,ignore
//! op!(binary Money, Add, add);
//! op!(scalar Money, Mul, mul, i64);
//! ```

#[macro_export]
macro_rules! op {
    (binary $for_struct:ident, $impl_trait:ident, $impl_fn:ident) => {
        impl std::ops::$impl_trait for $for_struct {
            type Output = Self;

            fn $impl_fn(self, rhs: Self) -> Self::Output {
                Self(std::ops::$impl_trait::$impl_fn(self.0, rhs.0))
            }
        }
    };

    (inplace $for_struct:ident, $impl_trait:ident, $impl_fn:ident) => {
        impl std::ops::$impl_trait for $for_struct {
            fn $impl_fn(&mut self, rhs: Self) {
                std::ops::$impl_trait::$impl_fn(&mut self.0, rhs.0)
            }
        }
    };

    (unary $for_struct:ident, $impl_trait:ident, $impl_fn:ident) => {
        impl std::ops::$impl_trait for $for_struct {
            type Output = Self;

            fn $impl_fn(self) -> Self::Output {
                Self(std::ops::$impl_trait::$impl_fn(self.0))
            }
        }
    };

    (scalar $for_struct:ident, $impl_trait:ident, $impl_fn:ident, $rhs:ty) => {
        impl std::ops::$impl_trait<$rhs> for $for_struct {
            type Output = Self;

            fn $impl_fn(self, rhs: $rhs) -> Self::Output {
                Self(std::ops::$impl_trait::$impl_fn(self.0, rhs))
            }
        }
    };
}

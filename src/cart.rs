//! Cart lines
//!
//! Immutable, validated line items. All prices are denominated in the store's
//! base currency; conversion happens later in [`crate::pricing`].

use rust_decimal::Decimal;
use thiserror::Error;

/// Maximum accepted length for an item name.
pub const MAX_ITEM_NAME_LEN: usize = 255;

/// Maximum accepted unit price, in the store's base currency.
///
/// Keeps every downstream sum and conversion far inside [`Decimal`] range, so
/// money math never overflows on accepted input.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Errors raised while constructing a [`CartLine`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    /// Item ids are external references and must be positive.
    #[error("item id must be positive")]
    InvalidItemId,

    /// Unit prices may be zero (free items) but never negative.
    #[error("unit price {0} is negative")]
    NegativeUnitPrice(Decimal),

    /// Unit price exceeds the accepted bound.
    #[error("unit price {price} exceeds the maximum of {max}")]
    PriceTooLarge {
        /// The rejected price.
        price: Decimal,
        /// The configured bound.
        max: Decimal,
    },

    /// A line with nothing on it is a caller bug, not an empty cart.
    #[error("quantity must be at least 1")]
    ZeroQuantity,

    /// Item name exceeds the accepted bound.
    #[error("item name is {len} characters, limit is {max}")]
    NameTooLong {
        /// Length of the rejected name.
        len: usize,
        /// The configured bound.
        max: usize,
    },
}

/// Kind of catalog item a cart line refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// A single digital file.
    File,

    /// A folder of digital files sold as one unit.
    Folder,

    /// A subscription package.
    Package,
}

/// A single validated line in a cart.
///
/// Construction is the one normalization step at the boundary: anything that
/// does not satisfy the invariants (`quantity >= 1`,
/// `0 <= unit_price <= MAX_UNIT_PRICE`, positive item id, bounded name) is
/// rejected up front rather than coerced.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    item_id: u64,
    kind: ItemKind,
    name: String,
    unit_price: Decimal,
    quantity: u32,
}

impl CartLine {
    /// Creates a validated cart line.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if the id is zero, the price is negative or
    /// above [`MAX_UNIT_PRICE`], the quantity is zero, or the name exceeds
    /// [`MAX_ITEM_NAME_LEN`].
    pub fn new(
        item_id: u64,
        kind: ItemKind,
        name: impl Into<String>,
        unit_price: Decimal,
        quantity: u32,
    ) -> Result<Self, CartError> {
        if item_id == 0 {
            return Err(CartError::InvalidItemId);
        }

        if unit_price.is_sign_negative() && !unit_price.is_zero() {
            return Err(CartError::NegativeUnitPrice(unit_price));
        }

        if unit_price > MAX_UNIT_PRICE {
            return Err(CartError::PriceTooLarge {
                price: unit_price,
                max: MAX_UNIT_PRICE,
            });
        }

        if quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }

        let name = name.into();

        if name.chars().count() > MAX_ITEM_NAME_LEN {
            return Err(CartError::NameTooLong {
                len: name.chars().count(),
                max: MAX_ITEM_NAME_LEN,
            });
        }

        Ok(Self {
            item_id,
            kind,
            name,
            unit_price,
            quantity,
        })
    }

    /// External catalog reference for this line.
    pub fn item_id(&self) -> u64 {
        self.item_id
    }

    /// Kind of catalog item.
    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Display name of the item.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unit price in the store's base currency.
    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    /// Number of units on this line.
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Extended price for the line (`unit_price * quantity`), full precision.
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

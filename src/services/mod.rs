// Catalog, cart and checkout
pub mod commerce;

// Order queries and the status reducer
pub mod order_status;
pub mod orders;

// Charge creation and gateway callbacks
pub mod payments;

/// Commerce services: catalog, cart and checkout
pub mod cart_service;
pub mod checkout_service;
pub mod pricing;
pub mod ticket_catalog_service;

// Re-export services for convenience
pub use cart_service::{AddToCartInput, CartService, CartWithItems, UpdateCartItemInput};
pub use checkout_service::{CheckoutInput, CheckoutResult, CheckoutService};
pub use ticket_catalog_service::{
    CreateTicketInput, TicketCatalogService, TicketPage, TicketSearchQuery, UpdateTicketInput,
};

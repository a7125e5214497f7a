//! Client-side state for browsing and moderating one configuration's reviews.

pub mod api;
pub mod error;
pub mod pagination;
pub mod rating;
pub mod transport;

pub use api::{ReviewsApi, DEFAULT_API_PREFIX};
pub use error::{PanelError, TransportError};
pub use pagination::{
    FetchOutcome, FilterSelector, PageCursorController, PageState, PanelEvent, PanelState,
    SkipReason, DEFAULT_PAGE_SIZE,
};
pub use rating::{review_display_rating, DisplayRating, RatingAggregator, RatingSnapshot};
pub use transport::{ApiTransport, HttpTransport};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

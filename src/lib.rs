pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::commands::{
    create_entry_impl, delete_entry_impl, delete_itinerary_impl, initialize_session_impl,
    layout_timeline_impl, leave_timeline_impl, list_itineraries_impl, select_day_impl,
    select_itinerary_impl, set_remember_me_impl, sign_in_impl, sign_out_impl,
    toggle_entry_expansion_impl, toggle_route_impl, update_entry_impl, AppState,
    RouteOverlayResponse, SelectItineraryResponse, SignInResponse, TimelineEntryView, TimelineView,
};
pub use application::route_overlay::{RouteOverlay, RouteOverlayFetcher};
pub use application::schedule_store::{DeleteConfirmation, ScheduleStore};
pub use application::session::{
    with_authorized_retry, SessionState, SessionTokenProvider, SignInOutcome, TokenSource,
};
pub use domain::models::{
    Itinerary, ItineraryKind, LatLng, LatLngBounds, ScheduleEntry, SessionToken,
};
pub use domain::timeline::{
    layout_day, DayLayout, ExpansionState, LayoutError, PositionedEntry, ROW_HEIGHT,
};
pub use infrastructure::error::CoreError;

pub mod domain;
pub mod ports;
pub mod router;
pub mod token;
pub mod topic;

pub use domain::{
    canonical_email, inbox_from_messages, ChatMessage, Identity, NewChatMessage, Role,
    SellerInbox, UserCredentials,
};
pub use ports::{ChatHistoryStore, ChatPublisher, PortError, PortResult, UserDirectory};
pub use router::{ChatSubmission, ChatTopicRouter, ChatValidationError, RouteError, RoutedMessage};
pub use token::{AuthError, IssuedToken, TokenCodec, TokenIssueError};
pub use topic::{listing_segment, participant_topic, sanitize_email};

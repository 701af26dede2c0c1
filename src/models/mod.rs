// Models module - Database entity representations

pub mod check_in;
pub mod gbu;
pub mod gym;
pub mod invitation;
pub mod member;
pub mod member_subscription;
pub mod payment;
pub mod product;
pub mod subscription;
pub mod ticket;

pub use check_in::CheckIn;
pub use gbu::GymUser;
pub use gym::Gym;
pub use invitation::Invitation;
pub use member::Member;
pub use member_subscription::MemberSubscription;
pub use payment::Payment;
pub use product::Product;
pub use subscription::Subscription;
pub use ticket::Ticket;

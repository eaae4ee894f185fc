// Module messaging - typed channels between the player and its surroundings

pub mod channels;
pub mod command;
pub mod notification;

pub use channels::{
    CommandConsumer, CommandProducer, NotificationBus, NotificationConsumer,
    create_command_channel,
};
pub use command::MetronomeCommand;
pub use notification::{MeasureNotification, Notification};

pub mod spotify;
pub mod ytmusic;

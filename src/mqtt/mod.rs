//! MQTT 3.1.1 client (QoS 0 subset): CONNECT/CONNACK, PUBLISH,
//! SUBSCRIBE/SUBACK, PINGREQ/PINGRESP, and topic-filter matching.

pub mod client;
pub mod packet;
pub mod topic;

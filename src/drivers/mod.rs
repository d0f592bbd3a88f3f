//! Hard device state machines: the two RPLidar serial drivers and the
//! SMC JXCE1 EtherCAT servo driver.

pub mod rplidar_a1;
pub mod rplidar_a2;
pub mod servo_jxce1;

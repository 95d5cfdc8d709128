//! Camera; only the size of the latest frame is tracked

use super::{Sensor, SensorBuffer, SensorCore, SensorKind, SensorSource};

pub struct Camera {
    core: SensorCore,
    frame_len: usize,
}

impl Camera {
    pub fn new(source: Box<dyn SensorSource>) -> Self {
        Self { core: SensorCore::new(SensorKind::Camera, source), frame_len: 0 }
    }

    pub fn buffer(&self) -> SensorBuffer {
        self.core.buffer()
    }
}

impl Sensor for Camera {
    type Data = usize;

    fn kind(&self) -> SensorKind {
        SensorKind::Camera
    }

    fn activate(&mut self) {
        self.core.activate();
    }

    fn deactivate(&mut self) {
        self.core.deactivate();
    }

    fn is_on(&self) -> bool {
        self.core.is_on()
    }

    fn read_data(&mut self) {
        if let Some(frame) = self.core.next_payload() {
            self.frame_len = frame.len();
        }
    }

    fn get_data(&self) -> usize {
        self.frame_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::ExternalSource;

    #[test]
    fn test_tracks_frame_length() {
        let mut camera = Camera::new(Box::new(ExternalSource));
        camera.activate();
        camera.buffer().write(vec![0u8; 2048]);
        camera.read_data();
        assert_eq!(camera.get_data(), 2048);

        camera.read_data();
        assert_eq!(camera.get_data(), 2048);
    }
}

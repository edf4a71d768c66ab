use attitude_estimator::{
    ArmedStatus, AttitudeSettings, AttitudeTask, ConfigSync, RawSample, SensorScale, TrimCalibrator,
};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;

const SAMPLE_PERIOD_MS: u32 = 4; // 250 Hz loop

fn main() {
    let samples: Channel<NoopRawMutex, RawSample, 4> = Channel::new();
    let config = ConfigSync::new();
    let trim = TrimCalibrator::new();

    let settings = AttitudeSettings::default();
    let mut task = AttitudeTask::new(SensorScale::default(), &settings).unwrap();
    config.apply(&settings, &trim).unwrap();

    let mut receiver = samples.receiver();
    let mut now = 1_000;

    for i in 0..2000 {
        // this send should happen each time the sensor driver has new data
        let raw = RawSample {
            gyro: [0, 0, 0],      // replace this with raw gyro counts
            accel: [0, 0, 4096],  // replace this with raw accel counts
            temperature: 0,
        };
        samples.try_send(raw).unwrap();

        let report = task.cycle(now, ArmedStatus::Disarmed, &mut receiver, &config, &trim);
        now += SAMPLE_PERIOD_MS;

        if let Some(attitude) = report.attitude.filter(|_| i % 250 == 0) {
            println!(
                "{:?} Roll: {:.2}, Pitch: {:.2}, Yaw: {:.2}",
                report.mode, attitude.roll, attitude.pitch, attitude.yaw
            );
        }
    }
}

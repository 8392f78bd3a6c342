// Copyright 2026 CEMAXECUTER LLC

use std::ffi::CString;
use std::os::raw::{c_char, c_double, c_int, c_void};
use std::ptr;

use num_complex::Complex32;

use crate::{ReceiveStatus, RxConfig, RxSource};

// UHD C API FFI bindings (manual, minimal)

type UhdError = c_int;
const UHD_ERROR_NONE: UhdError = 0;

// Opaque handle types
type UhdUsrpHandle = *mut c_void;
type UhdRxStreamerHandle = *mut c_void;
type UhdRxMetadataHandle = *mut c_void;

// Tune request policy
const UHD_TUNE_REQUEST_POLICY_AUTO: c_int = 65;

// Stream modes
const UHD_STREAM_MODE_START_CONTINUOUS: c_int = 97;
const UHD_STREAM_MODE_STOP_CONTINUOUS: c_int = 111;

// RX metadata error codes
const UHD_RX_METADATA_ERROR_CODE_NONE: c_int = 0x0;
const UHD_RX_METADATA_ERROR_CODE_TIMEOUT: c_int = 0x1;
const UHD_RX_METADATA_ERROR_CODE_OVERFLOW: c_int = 0x8;

#[repr(C)]
struct UhdTuneRequest {
    target_freq: c_double,
    rf_freq_policy: c_int,
    rf_freq: c_double,
    dsp_freq_policy: c_int,
    dsp_freq: c_double,
    args: *mut c_char,
}

#[repr(C)]
struct UhdTuneResult {
    clipped_rf_freq: c_double,
    target_rf_freq: c_double,
    actual_rf_freq: c_double,
    target_dsp_freq: c_double,
    actual_dsp_freq: c_double,
}

#[repr(C)]
struct UhdStreamArgs {
    cpu_format: *mut c_char,
    otw_format: *mut c_char,
    args: *mut c_char,
    channel_list: *mut usize,
    n_channels: c_int,
}

#[repr(C)]
struct UhdStreamCmd {
    stream_mode: c_int,
    num_samps: usize,
    stream_now: bool,
    time_spec_full_secs: i64,
    time_spec_frac_secs: c_double,
}

extern "C" {
    // USRP
    fn uhd_usrp_make(h: *mut UhdUsrpHandle, args: *const c_char) -> UhdError;
    fn uhd_usrp_free(h: *mut UhdUsrpHandle) -> UhdError;
    fn uhd_usrp_set_rx_rate(h: UhdUsrpHandle, rate: c_double, chan: usize) -> UhdError;
    fn uhd_usrp_get_rx_rate(h: UhdUsrpHandle, chan: usize, rate_out: *mut c_double) -> UhdError;
    fn uhd_usrp_set_rx_gain(
        h: UhdUsrpHandle,
        gain: c_double,
        chan: usize,
        gain_name: *const c_char,
    ) -> UhdError;
    fn uhd_usrp_get_rx_gain(
        h: UhdUsrpHandle,
        chan: usize,
        gain_name: *const c_char,
        gain_out: *mut c_double,
    ) -> UhdError;
    fn uhd_usrp_set_rx_freq(
        h: UhdUsrpHandle,
        tune_request: *mut UhdTuneRequest,
        chan: usize,
        tune_result: *mut UhdTuneResult,
    ) -> UhdError;
    fn uhd_usrp_get_rx_freq(h: UhdUsrpHandle, chan: usize, freq_out: *mut c_double) -> UhdError;
    fn uhd_usrp_get_rx_stream(
        h: UhdUsrpHandle,
        stream_args: *mut UhdStreamArgs,
        h_out: UhdRxStreamerHandle,
    ) -> UhdError;

    // RX Streamer
    fn uhd_rx_streamer_make(h: *mut UhdRxStreamerHandle) -> UhdError;
    fn uhd_rx_streamer_free(h: *mut UhdRxStreamerHandle) -> UhdError;
    fn uhd_rx_streamer_recv(
        h: UhdRxStreamerHandle,
        buffs: *mut *mut c_void,
        samps_per_buff: usize,
        md: *mut UhdRxMetadataHandle,
        timeout: c_double,
        one_packet: bool,
        items_recvd: *mut usize,
    ) -> UhdError;
    fn uhd_rx_streamer_issue_stream_cmd(
        h: UhdRxStreamerHandle,
        stream_cmd: *const UhdStreamCmd,
    ) -> UhdError;

    // RX Metadata
    fn uhd_rx_metadata_make(handle: *mut UhdRxMetadataHandle) -> UhdError;
    fn uhd_rx_metadata_free(handle: *mut UhdRxMetadataHandle) -> UhdError;
    fn uhd_rx_metadata_error_code(h: UhdRxMetadataHandle, error_code_out: *mut c_int) -> UhdError;
}

/// USRP RX source using the UHD C API.
///
/// Samples are delivered host-side as fc32, sc16 over the wire.
pub struct UsrpSource {
    usrp: UhdUsrpHandle,
    rx: UhdRxStreamerHandle,
    md: UhdRxMetadataHandle,
    streaming: bool,
}

// Raw UHD handles are only ever touched from the thread that owns the
// source (the producer); UHD itself allows cross-thread handle use.
unsafe impl Send for UsrpSource {}

impl UsrpSource {
    /// Open a USRP device. `device_args` is a UHD device-args string,
    /// e.g. "" for the first device or "serial=XXXXXXX".
    pub fn new(device_args: &str) -> Result<Self, String> {
        let args = CString::new(device_args).map_err(|e| format!("CString error: {}", e))?;
        let mut usrp: UhdUsrpHandle = ptr::null_mut();

        unsafe {
            log::info!("opening USRP (args: '{}')", device_args);
            let err = uhd_usrp_make(&mut usrp, args.as_ptr());
            if err != UHD_ERROR_NONE {
                return Err(format!("uhd_usrp_make failed: error {}", err));
            }
        }

        Ok(Self {
            usrp,
            rx: ptr::null_mut(),
            md: ptr::null_mut(),
            streaming: false,
        })
    }

    fn make_streamer(&mut self) -> Result<(), String> {
        if !self.rx.is_null() {
            return Ok(());
        }

        unsafe {
            let err = uhd_rx_streamer_make(&mut self.rx);
            if err != UHD_ERROR_NONE {
                return Err(format!("uhd_rx_streamer_make failed: error {}", err));
            }

            let err = uhd_rx_metadata_make(&mut self.md);
            if err != UHD_ERROR_NONE {
                uhd_rx_streamer_free(&mut self.rx);
                self.rx = ptr::null_mut();
                return Err(format!("uhd_rx_metadata_make failed: error {}", err));
            }

            // fc32 on the host, sc16 on the wire
            let cpu_fmt = CString::new("fc32").unwrap();
            let otw_fmt = CString::new("sc16").unwrap();
            let stream_args_str = CString::new("").unwrap();
            let mut channel: usize = 0;

            let mut stream_args = UhdStreamArgs {
                cpu_format: cpu_fmt.as_ptr() as *mut c_char,
                otw_format: otw_fmt.as_ptr() as *mut c_char,
                args: stream_args_str.as_ptr() as *mut c_char,
                channel_list: &mut channel,
                n_channels: 1,
            };

            let err = uhd_usrp_get_rx_stream(self.usrp, &mut stream_args, self.rx);
            if err != UHD_ERROR_NONE {
                uhd_rx_metadata_free(&mut self.md);
                uhd_rx_streamer_free(&mut self.rx);
                self.rx = ptr::null_mut();
                self.md = ptr::null_mut();
                return Err(format!("uhd_usrp_get_rx_stream failed: error {}", err));
            }
        }

        Ok(())
    }

    fn issue_stream_cmd(&mut self, mode: c_int) -> Result<(), String> {
        let cmd = UhdStreamCmd {
            stream_mode: mode,
            num_samps: 0,
            stream_now: true,
            time_spec_full_secs: 0,
            time_spec_frac_secs: 0.0,
        };
        unsafe {
            let err = uhd_rx_streamer_issue_stream_cmd(self.rx, &cmd);
            if err != UHD_ERROR_NONE {
                return Err(format!(
                    "uhd_rx_streamer_issue_stream_cmd failed: error {}",
                    err
                ));
            }
        }
        Ok(())
    }
}

impl RxSource for UsrpSource {
    fn configure(&mut self, cfg: &RxConfig) -> Result<RxConfig, String> {
        let empty = CString::new("").unwrap();

        unsafe {
            let err = uhd_usrp_set_rx_rate(self.usrp, cfg.sample_rate, 0);
            if err != UHD_ERROR_NONE {
                return Err(format!("uhd_usrp_set_rx_rate failed: error {}", err));
            }

            let err = uhd_usrp_set_rx_gain(self.usrp, cfg.gain, 0, empty.as_ptr());
            if err != UHD_ERROR_NONE {
                return Err(format!("uhd_usrp_set_rx_gain failed: error {}", err));
            }

            let mut tune_req = UhdTuneRequest {
                target_freq: cfg.center_freq,
                rf_freq_policy: UHD_TUNE_REQUEST_POLICY_AUTO,
                rf_freq: 0.0,
                dsp_freq_policy: UHD_TUNE_REQUEST_POLICY_AUTO,
                dsp_freq: 0.0,
                args: ptr::null_mut(),
            };
            let mut tune_result = UhdTuneResult {
                clipped_rf_freq: 0.0,
                target_rf_freq: 0.0,
                actual_rf_freq: 0.0,
                target_dsp_freq: 0.0,
                actual_dsp_freq: 0.0,
            };
            let err = uhd_usrp_set_rx_freq(self.usrp, &mut tune_req, 0, &mut tune_result);
            if err != UHD_ERROR_NONE {
                return Err(format!("uhd_usrp_set_rx_freq failed: error {}", err));
            }

            // Read back what the hardware actually achieved
            let mut actual = RxConfig {
                sample_rate: 0.0,
                center_freq: 0.0,
                gain: 0.0,
            };
            let err = uhd_usrp_get_rx_rate(self.usrp, 0, &mut actual.sample_rate);
            if err != UHD_ERROR_NONE {
                return Err(format!("uhd_usrp_get_rx_rate failed: error {}", err));
            }
            let err = uhd_usrp_get_rx_freq(self.usrp, 0, &mut actual.center_freq);
            if err != UHD_ERROR_NONE {
                return Err(format!("uhd_usrp_get_rx_freq failed: error {}", err));
            }
            let err = uhd_usrp_get_rx_gain(self.usrp, 0, empty.as_ptr(), &mut actual.gain);
            if err != UHD_ERROR_NONE {
                return Err(format!("uhd_usrp_get_rx_gain failed: error {}", err));
            }

            log::info!(
                "USRP tuned: {:.3} MS/s, RF {:.3} MHz (DSP {:.1} kHz), gain {:.1} dB",
                actual.sample_rate / 1e6,
                tune_result.actual_rf_freq / 1e6,
                tune_result.actual_dsp_freq / 1e3,
                actual.gain,
            );

            Ok(actual)
        }
    }

    fn start_streaming(&mut self) -> Result<(), String> {
        self.make_streamer()?;
        self.issue_stream_cmd(UHD_STREAM_MODE_START_CONTINUOUS)?;
        self.streaming = true;
        log::info!("USRP streaming started");
        Ok(())
    }

    fn stop_streaming(&mut self) {
        if self.streaming {
            if let Err(e) = self.issue_stream_cmd(UHD_STREAM_MODE_STOP_CONTINUOUS) {
                log::warn!("stop stream: {}", e);
            }
            self.streaming = false;
        }
    }

    fn receive(&mut self, buf: &mut [Complex32], timeout_secs: f64) -> ReceiveStatus {
        if self.rx.is_null() {
            return ReceiveStatus::Error("receive called before start_streaming".to_string());
        }

        let mut buf_ptr = buf.as_mut_ptr() as *mut c_void;
        let mut num_rx: usize = 0;

        unsafe {
            let err = uhd_rx_streamer_recv(
                self.rx,
                &mut buf_ptr,
                buf.len(),
                &mut self.md,
                timeout_secs,
                false, // one_packet
                &mut num_rx,
            );
            if err != UHD_ERROR_NONE {
                return ReceiveStatus::Error(format!("uhd_rx_streamer_recv: error {}", err));
            }

            let mut error_code: c_int = 0;
            uhd_rx_metadata_error_code(self.md, &mut error_code);

            match error_code {
                UHD_RX_METADATA_ERROR_CODE_NONE => ReceiveStatus::Samples(num_rx),
                UHD_RX_METADATA_ERROR_CODE_TIMEOUT => ReceiveStatus::Timeout,
                UHD_RX_METADATA_ERROR_CODE_OVERFLOW => ReceiveStatus::Overflow,
                code => ReceiveStatus::Error(format!("rx metadata error code {}", code)),
            }
        }
    }
}

impl Drop for UsrpSource {
    fn drop(&mut self) {
        self.stop_streaming();
        unsafe {
            if !self.md.is_null() {
                uhd_rx_metadata_free(&mut self.md);
            }
            if !self.rx.is_null() {
                uhd_rx_streamer_free(&mut self.rx);
            }
            if !self.usrp.is_null() {
                uhd_usrp_free(&mut self.usrp);
            }
        }
    }
}

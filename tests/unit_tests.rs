//! Unit tests for the translation layer
//!
//! These tests need no running task: error and timeout translation, option
//! flags, configuration and the diagnostic command.

#[cfg(test)]
mod error_tests {
    use proptest::prelude::*;
    use ucosiii::error::{rt_result, OsError};
    use ucosiii::port::*;

    #[test]
    fn test_error_variants() {
        assert!(OsError::None.is_ok());
        assert!(!OsError::None.is_err());

        assert!(!OsError::Timeout.is_ok());
        assert!(OsError::Timeout.is_err());

        assert_eq!(OsError::None, OsError::None);
        assert_ne!(OsError::None, OsError::Timeout);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(OsError::None.code(), 0);
        assert_eq!(OsError::Timeout.code(), 29401);
        assert_eq!(OsError::PendAbort.code(), 25001);
        assert_eq!(OsError::ObjDel.code(), 24002);
        assert_eq!(OsError::MutexNesting.code(), 22403);
    }

    #[test]
    fn test_error_display() {
        let text = format!("{}", OsError::Timeout);
        assert!(text.contains("29401"));
    }

    #[test]
    fn test_kernel_codes() {
        assert_eq!(rt_result(RT_EOK), Ok(()));
        assert_eq!(rt_result(-RT_ETIMEOUT), Err(OsError::Timeout));
        assert_eq!(rt_result(-RT_EFULL), Err(OsError::QMax));
        assert_eq!(rt_result(-RT_EINVAL), Err(OsError::OptInvalid));
        assert_eq!(rt_result(-RT_ENOMEM), Err(OsError::RtNoMem));
    }

    proptest! {
        #[test]
        fn translation_is_total(code in any::<i32>()) {
            let err = OsError::from_rt(code);
            prop_assert_eq!(err == OsError::None, code == RT_EOK);
        }

        #[test]
        fn unknown_codes_are_generic(code in 11i32..) {
            prop_assert_eq!(OsError::from_rt(-code), OsError::RtError);
            prop_assert_eq!(OsError::from_rt(code), OsError::RtError);
        }
    }
}

#[cfg(test)]
mod timeout_tests {
    use proptest::prelude::*;
    use ucosiii::port::{RT_WAITING_FOREVER, RT_WAITING_NO};
    use ucosiii::types::{opt, PendTimeout};

    #[test]
    fn test_zero_blocks_forever() {
        let t = PendTimeout::from_ucos(0, opt::PEND_BLOCKING);
        assert_eq!(t, PendTimeout::Forever);
        assert_eq!(t.to_rt(), RT_WAITING_FOREVER);
        assert!(!t.is_non_blocking());
    }

    #[test]
    fn test_huge_timeout_is_clamped() {
        let t = PendTimeout::from_ucos(u32::MAX, opt::PEND_BLOCKING);
        assert_eq!(t.to_rt(), i32::MAX);
    }

    proptest! {
        #[test]
        fn non_blocking_wins(timeout in any::<u32>()) {
            let t = PendTimeout::from_ucos(timeout, opt::PEND_NON_BLOCKING);
            prop_assert!(t.is_non_blocking());
            prop_assert_eq!(t.to_rt(), RT_WAITING_NO);
        }

        #[test]
        fn ticks_pass_through(timeout in 1u32..=i32::MAX as u32) {
            let t = PendTimeout::from_ucos(timeout, opt::PEND_BLOCKING);
            prop_assert_eq!(t, PendTimeout::Ticks(timeout));
            prop_assert_eq!(t.to_rt(), timeout as i32);
        }
    }
}

#[cfg(test)]
mod types_tests {
    use ucosiii::types::*;

    #[test]
    fn test_pend_status_enum() {
        let status = OsPendStatus::Ok;
        assert_eq!(status, OsPendStatus::Ok);
        assert_ne!(status, OsPendStatus::Timeout);
    }

    #[test]
    fn test_option_flags() {
        use ucosiii::types::opt::*;

        assert_eq!(NONE, 0);
        assert_eq!(PEND_NON_BLOCKING, 0x8000);
        assert_eq!(POST_NO_SCHED, 0x8000);

        let combined = POST_ALL | POST_NO_SCHED;
        assert_eq!(combined & POST_NO_SCHED, POST_NO_SCHED);
        assert_eq!(combined & POST_LIFO, 0);
    }

    #[test]
    fn test_object_tags_are_distinct() {
        let tags = [
            OsObjType::Flag,
            OsObjType::Mutex,
            OsObjType::Queue,
            OsObjType::Sem,
            OsObjType::Task,
            OsObjType::Timer,
        ];
        for (i, a) in tags.iter().enumerate() {
            for b in &tags[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}

#[cfg(test)]
mod config_tests {
    use ucosiii::config::*;

    #[test]
    fn test_config_values() {
        assert!(CFG_PRIO_MAX >= 8, "Need at least 8 priority levels");
        assert!(CFG_PRIO_MAX <= 256, "Too many priority levels");

        assert!(CFG_STK_SIZE_MIN >= 32, "Stack too small");

        assert!(CFG_TICK_RATE_HZ >= 10, "Tick rate too slow");
        assert!(CFG_TICK_RATE_HZ <= 10000, "Tick rate too fast");
        assert_eq!(CFG_TICK_RATE_HZ % CFG_TMR_TASK_RATE_HZ, 0);

        // Idle priority should be lowest
        assert_eq!(CFG_PRIO_IDLE, (CFG_PRIO_MAX - 1) as u8);
    }

    #[test]
    fn test_version() {
        assert_eq!(ucosiii::kernel::os_version(), 30803);
    }
}

#[cfg(test)]
mod shell_tests {
    use ucosiii::sem::OsSem;
    use ucosiii::shell::ucos_cmd;

    #[test]
    fn test_lists_semaphores() {
        static SEM: OsSem = OsSem::new();
        SEM.create("diag_sem", 0).unwrap();

        let mut out = String::new();
        ucos_cmd(&["-sem"], &mut out).unwrap();
        assert!(out.lines().any(|l| l.trim() == "diag_sem"));

        SEM.del(ucosiii::types::opt::DEL_ALWAYS).unwrap();
        let mut out = String::new();
        ucos_cmd(&["-sem"], &mut out).unwrap();
        assert!(!out.contains("diag_sem"));
    }

    #[test]
    fn test_usage() {
        let mut out = String::new();
        ucos_cmd(&["-task", "extra"], &mut out).unwrap();
        assert!(out.starts_with("usage: ucos"));
    }
}

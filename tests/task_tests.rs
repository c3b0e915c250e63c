//! Task management, built-in objects and time delays on the host kernel

mod common;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use common::{serial, settle, spawn, spawn_with_q, tick, wait_until};
use ucosiii::error::{OsError, OsResult};
use ucosiii::task::*;
use ucosiii::types::opt;

fn record<T>(log: &Mutex<Vec<T>>, value: T) {
    log.lock().unwrap().push(value);
}

fn recorded<T: Clone>(log: &Mutex<Vec<T>>) -> Vec<T> {
    log.lock().unwrap().clone()
}

#[cfg(test)]
mod create_tests {
    use super::*;
    use ucosiii::config::{CFG_PRIO_IDLE, CFG_STK_SIZE_MIN};

    static HOLD: AtomicBool = AtomicBool::new(true);

    fn parked(_: *mut ()) {
        while HOLD.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_create_checks() {
        static TCB: OsTcb = OsTcb::new();

        let _guard = serial();
        let create = |prio, stk| {
            os_task_create(&TCB, "chk", parked, core::ptr::null_mut(), prio, stk, 0, 0, opt::TASK_STK_CHK)
        };
        assert_eq!(create(CFG_PRIO_IDLE, 256), Err(OsError::PrioInvalid));
        assert_eq!(create(10, CFG_STK_SIZE_MIN - 1), Err(OsError::StkSizeInvalid));

        HOLD.store(true, Ordering::SeqCst);
        assert_eq!(create(10, 256), Ok(()));
        assert!(TCB.is_created());
        assert_eq!(TCB.name(), "chk");
        assert_eq!(TCB.prio(), 10);
        assert_eq!(TCB.opt(), opt::TASK_STK_CHK);
        assert_eq!(create(10, 256), Err(OsError::ObjCreated));

        HOLD.store(false, Ordering::SeqCst);
        assert!(wait_until(|| !TCB.is_created()));
    }

    #[test]
    fn test_change_prio_and_quanta() {
        static TCB: OsTcb = OsTcb::new();

        let _guard = serial();
        HOLD.store(true, Ordering::SeqCst);
        spawn(&TCB, "prio", parked, 14);
        assert_eq!(TCB.time_quanta(), ucosiii::config::CFG_TIME_QUANTA_DEFAULT);

        os_task_change_prio(Some(&TCB), 7).unwrap();
        assert_eq!(TCB.prio(), 7);
        assert_eq!(TCB.current_prio(), 7);
        assert_eq!(os_task_change_prio(Some(&TCB), CFG_PRIO_IDLE), Err(OsError::PrioInvalid));

        os_task_time_quanta_set(Some(&TCB), 3).unwrap();
        assert_eq!(TCB.time_quanta(), 3);
        os_task_time_quanta_set(Some(&TCB), 0).unwrap();
        assert_eq!(TCB.time_quanta(), ucosiii::config::CFG_TIME_QUANTA_DEFAULT);

        HOLD.store(false, Ordering::SeqCst);
        assert!(wait_until(|| !TCB.is_created()));
        assert_eq!(os_task_change_prio(Some(&TCB), 7), Err(OsError::TaskNotExist));
    }
}

#[cfg(test)]
mod suspend_tests {
    use super::*;

    static COUNT: AtomicU32 = AtomicU32::new(0);
    static STOP: AtomicBool = AtomicBool::new(false);

    fn spinner(_: *mut ()) {
        while !STOP.load(Ordering::SeqCst) {
            COUNT.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(1));
            ucosiii::kernel::os_sched();
        }
    }

    fn is_frozen() -> bool {
        settle();
        let before = COUNT.load(Ordering::SeqCst);
        settle();
        COUNT.load(Ordering::SeqCst) == before
    }

    #[test]
    fn test_suspend_nests() {
        static TCB: OsTcb = OsTcb::new();

        let _guard = serial();
        STOP.store(false, Ordering::SeqCst);
        spawn(&TCB, "spin", spinner, 10);
        assert!(wait_until(|| COUNT.load(Ordering::SeqCst) > 0));

        os_task_suspend(Some(&TCB)).unwrap();
        os_task_suspend(Some(&TCB)).unwrap();
        assert_eq!(TCB.suspend_ctr(), 2);
        assert!(is_frozen());

        os_task_resume(Some(&TCB)).unwrap();
        assert!(TCB.is_suspended());
        assert!(is_frozen());

        os_task_resume(Some(&TCB)).unwrap();
        assert!(!TCB.is_suspended());
        let before = COUNT.load(Ordering::SeqCst);
        assert!(wait_until(|| COUNT.load(Ordering::SeqCst) > before));

        assert_eq!(os_task_resume(Some(&TCB)), Err(OsError::TaskNotSuspended));

        STOP.store(true, Ordering::SeqCst);
        assert!(wait_until(|| !TCB.is_created()));
    }

    #[test]
    fn test_delete_other_task() {
        static TCB: OsTcb = OsTcb::new();
        static SEM: ucosiii::sem::OsSem = ucosiii::sem::OsSem::new();
        static REACHED: AtomicBool = AtomicBool::new(false);

        fn blocked(_: *mut ()) {
            let _ = SEM.pend(0, opt::PEND_BLOCKING);
            REACHED.store(true, Ordering::SeqCst);
        }

        let _guard = serial();
        SEM.create("del_sem", 0).unwrap();
        spawn(&TCB, "victim", blocked, 10);
        assert!(wait_until(|| SEM.waiting() == 1));
        assert!(TCB.is_pending());

        os_task_del(Some(&TCB)).unwrap();
        assert!(!TCB.is_created());
        assert_eq!(SEM.waiting(), 0);
        assert_eq!(os_task_del(Some(&TCB)), Err(OsError::TaskNotExist));

        settle();
        assert!(!REACHED.load(Ordering::SeqCst));
        SEM.del(opt::DEL_NO_PEND).unwrap();
    }

    #[test]
    fn test_deleted_task_never_pends() {
        static TCB: OsTcb = OsTcb::new();
        static SEM: ucosiii::sem::OsSem = ucosiii::sem::OsSem::new();
        static GO: AtomicBool = AtomicBool::new(false);
        static REACHED: AtomicBool = AtomicBool::new(false);

        fn busy(_: *mut ()) {
            while !GO.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
            let _ = SEM.pend(0, opt::PEND_BLOCKING);
            REACHED.store(true, Ordering::SeqCst);
        }

        let _guard = serial();
        SEM.create("del_busy", 0).unwrap();
        spawn(&TCB, "busy", busy, 10);
        settle();

        // Deleted while running user code; stops at its next kernel call
        os_task_del(Some(&TCB)).unwrap();
        GO.store(true, Ordering::SeqCst);
        settle();
        assert_eq!(SEM.waiting(), 0);

        assert_eq!(SEM.post(opt::POST_1), Ok(1));
        settle();
        assert!(!REACHED.load(Ordering::SeqCst));
        assert_eq!(SEM.count(), 1);
        SEM.del(opt::DEL_NO_PEND).unwrap();
    }

    #[test]
    fn test_suspend_lands_before_delay() {
        static TCB: OsTcb = OsTcb::new();
        static LOOPS: AtomicU32 = AtomicU32::new(0);
        static DONE: AtomicBool = AtomicBool::new(false);

        fn looper(_: *mut ()) {
            while !DONE.load(Ordering::SeqCst) {
                LOOPS.fetch_add(1, Ordering::SeqCst);
                if ucosiii::time::os_time_dly(1, opt::TIME_DLY).is_err() {
                    return;
                }
            }
        }

        fn step(n: u32) {
            for _ in 0..n {
                tick(1);
                settle();
            }
        }

        let _guard = serial();
        DONE.store(false, Ordering::SeqCst);
        spawn(&TCB, "looper", looper, 10);
        assert!(wait_until(|| TCB.is_delayed()));
        step(3);
        assert!(LOOPS.load(Ordering::SeqCst) >= 2);

        os_task_suspend(Some(&TCB)).unwrap();
        settle();
        let before = LOOPS.load(Ordering::SeqCst);
        tick(20);
        settle();
        assert_eq!(LOOPS.load(Ordering::SeqCst), before);
        assert_eq!(TCB.suspend_ctr(), 1);

        os_task_resume(Some(&TCB)).unwrap();
        step(3);
        assert!(LOOPS.load(Ordering::SeqCst) > before);

        DONE.store(true, Ordering::SeqCst);
        assert!(wait_until(|| {
            tick(1);
            !TCB.is_created()
        }));
    }

    #[test]
    fn test_suspend_while_pending() {
        static TCB: OsTcb = OsTcb::new();
        static SEM: ucosiii::sem::OsSem = ucosiii::sem::OsSem::new();
        static LOG: Mutex<Vec<OsResult<ucosiii::types::OsSemCtr>>> = Mutex::new(Vec::new());

        fn waiter(_: *mut ()) {
            record(&LOG, SEM.pend(0, opt::PEND_BLOCKING));
        }

        let _guard = serial();
        SEM.create("susp_pend", 0).unwrap();
        spawn(&TCB, "pender", waiter, 10);
        assert!(wait_until(|| SEM.waiting() == 1));

        os_task_suspend(Some(&TCB)).unwrap();
        assert_eq!(TCB.suspend_ctr(), 1);

        // The wait completes but the task stays suspended
        assert_eq!(SEM.post(opt::POST_1), Ok(0));
        settle();
        assert!(recorded(&LOG).is_empty());
        assert!(TCB.is_created());
        assert_eq!(SEM.waiting(), 0);

        os_task_resume(Some(&TCB)).unwrap();
        assert!(wait_until(|| recorded(&LOG).len() == 1));
        assert_eq!(recorded(&LOG), vec![Ok(0)]);
        assert!(wait_until(|| !TCB.is_created()));
        SEM.del(opt::DEL_NO_PEND).unwrap();
    }
}

#[cfg(test)]
mod reg_tests {
    use super::*;
    use ucosiii::types::{OsReg, OsRegId};

    #[test]
    fn test_registers() {
        static TCB: OsTcb = OsTcb::new();
        static ID: Mutex<Option<OsRegId>> = Mutex::new(None);
        static DONE: AtomicBool = AtomicBool::new(false);

        fn writer(_: *mut ()) {
            if let Ok(id) = os_task_reg_get_id() {
                let _ = os_task_reg_set(None, id, 0xBEEF as OsReg);
                *ID.lock().unwrap() = Some(id);
            }
            while !DONE.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        let _guard = serial();
        spawn(&TCB, "regs", writer, 10);
        assert!(wait_until(|| ID.lock().unwrap().is_some()));
        let id = ID.lock().unwrap().unwrap();
        assert_eq!(os_task_reg_get(Some(&TCB), id), Ok(0xBEEF));
        os_task_reg_set(Some(&TCB), id, 7).unwrap();
        assert_eq!(os_task_reg_get(Some(&TCB), id), Ok(7));
        assert_eq!(os_task_reg_get(Some(&TCB), 200), Err(OsError::TaskRegIdInvalid));

        DONE.store(true, Ordering::SeqCst);
        assert!(wait_until(|| !TCB.is_created()));
    }
}

#[cfg(test)]
mod builtin_tests {
    use super::*;
    use ucosiii::types::OsSemCtr;

    #[test]
    fn test_task_sem() {
        static TCB: OsTcb = OsTcb::new();
        static LOG: Mutex<Vec<OsResult<OsSemCtr>>> = Mutex::new(Vec::new());

        fn waiter(_: *mut ()) {
            record(&LOG, os_task_sem_pend(0, opt::PEND_BLOCKING));
            record(&LOG, os_task_sem_pend(0, opt::PEND_BLOCKING));
            record(&LOG, os_task_sem_pend(0, opt::PEND_NON_BLOCKING));
        }

        let _guard = serial();
        spawn(&TCB, "tsem", waiter, 10);
        assert!(wait_until(|| TCB.is_pending()));
        settle();
        assert_eq!(os_task_sem_post(Some(&TCB), opt::POST_1), Ok(0));
        assert!(wait_until(|| recorded(&LOG).len() == 1));

        assert!(wait_until(|| TCB.is_pending()));
        settle();
        assert_eq!(os_task_sem_pend_abort(&TCB, opt::NONE), Ok(()));
        assert!(wait_until(|| recorded(&LOG).len() == 3));
        assert_eq!(
            recorded(&LOG),
            vec![Ok(0), Err(OsError::PendAbort), Err(OsError::PendWouldBlock)]
        );
        assert!(wait_until(|| !TCB.is_created()));
        assert_eq!(os_task_sem_post(Some(&TCB), opt::POST_1), Err(OsError::TaskObjNotCreated));
    }

    #[test]
    fn test_task_sem_set() {
        static TCB: OsTcb = OsTcb::new();
        static DONE: AtomicBool = AtomicBool::new(false);

        fn idle(_: *mut ()) {
            while !DONE.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        let _guard = serial();
        spawn(&TCB, "tset", idle, 10);
        os_task_sem_post(Some(&TCB), opt::POST_1).unwrap();
        os_task_sem_post(Some(&TCB), opt::POST_1).unwrap();
        assert_eq!(TCB.sem_ctr(), 2);
        assert_eq!(os_task_sem_set(Some(&TCB), 9), Ok(2));
        assert_eq!(TCB.sem_ctr(), 9);
        assert_eq!(os_task_sem_pend_abort(&TCB, opt::NONE), Err(OsError::PendAbortNone));

        DONE.store(true, Ordering::SeqCst);
        assert!(wait_until(|| !TCB.is_created()));
    }

    #[test]
    fn test_task_queue() {
        static TCB: OsTcb = OsTcb::new();
        static NO_Q: OsTcb = OsTcb::new();
        static GOT: Mutex<Vec<usize>> = Mutex::new(Vec::new());
        static STOP: AtomicBool = AtomicBool::new(false);
        static WORDS: [u8; 3] = [1, 2, 3];

        fn reader(_: *mut ()) {
            while let Ok(m) = os_task_q_pend(0, opt::PEND_BLOCKING) {
                record(&GOT, m.size);
            }
        }

        fn plain(_: *mut ()) {
            while !STOP.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        let _guard = serial();
        spawn_with_q(&TCB, "tq", reader, 10, 2);
        spawn(&NO_Q, "tnoq", plain, 11);
        let ptr = WORDS.as_ptr() as *const ();

        assert!(wait_until(|| TCB.is_pending()));
        os_task_q_post(Some(&TCB), ptr, 1, opt::POST_FIFO).unwrap();
        assert!(wait_until(|| recorded(&GOT) == vec![1]));

        assert_eq!(
            os_task_q_post(Some(&NO_Q), ptr, 1, opt::POST_FIFO),
            Err(OsError::TaskObjNotCreated)
        );

        // Aborting the reader's pend ends its loop
        assert!(wait_until(|| TCB.is_pending()));
        settle();
        assert_eq!(os_task_q_pend_abort(&TCB, opt::NONE), Ok(()));
        assert!(wait_until(|| !TCB.is_created()));

        STOP.store(true, Ordering::SeqCst);
        assert!(wait_until(|| !NO_Q.is_created()));
    }
}

#[cfg(test)]
mod time_tests {
    use super::*;
    use ucosiii::kernel::{os_sched_lock, os_sched_unlock};
    use ucosiii::time::*;
    use ucosiii::types::OsTick;

    #[test]
    fn test_delay_expires_on_ticks() {
        static TCB: OsTcb = OsTcb::new();
        static LOG: Mutex<Vec<(OsResult<()>, OsTick)>> = Mutex::new(Vec::new());

        fn sleeper(_: *mut ()) {
            let start = os_time_get();
            let r = os_time_dly(5, opt::TIME_DLY);
            record(&LOG, (r, os_time_get().wrapping_sub(start)));
        }

        let _guard = serial();
        spawn(&TCB, "sleep", sleeper, 10);
        assert!(wait_until(|| TCB.is_delayed()));
        settle();
        tick(4);
        settle();
        assert!(recorded(&LOG).is_empty());
        tick(1);
        assert!(wait_until(|| recorded(&LOG).len() == 1));
        assert_eq!(recorded(&LOG)[0], (Ok(()), 5));
    }

    #[test]
    fn test_resume_delayed_task() {
        static TCB: OsTcb = OsTcb::new();
        static LOG: Mutex<Vec<OsResult<()>>> = Mutex::new(Vec::new());

        fn sleeper(_: *mut ()) {
            record(&LOG, os_time_dly(100_000, opt::TIME_DLY));
            record(&LOG, os_time_dly(0, opt::TIME_DLY));
            record(&LOG, os_time_dly(os_time_get(), opt::TIME_MATCH));
        }

        let _guard = serial();
        spawn(&TCB, "resume", sleeper, 10);
        assert!(wait_until(|| TCB.is_delayed()));
        settle();
        assert_eq!(os_time_dly_resume(&TCB), Ok(()));
        assert!(wait_until(|| recorded(&LOG).len() == 3));
        assert_eq!(
            recorded(&LOG),
            vec![Ok(()), Err(OsError::TimeZeroDly), Err(OsError::TimeZeroDly)]
        );
        assert_eq!(os_time_dly_resume(&TCB), Err(OsError::TaskNotDly));
    }

    #[test]
    fn test_resume_delay_of_suspended_task() {
        static TCB: OsTcb = OsTcb::new();
        static LOG: Mutex<Vec<OsResult<()>>> = Mutex::new(Vec::new());

        fn sleeper(_: *mut ()) {
            record(&LOG, os_time_dly(100_000, opt::TIME_DLY));
        }

        let _guard = serial();
        spawn(&TCB, "dlysusp", sleeper, 10);
        assert!(wait_until(|| TCB.is_delayed()));
        settle();
        os_task_suspend(Some(&TCB)).unwrap();

        // The delay ends, the suspension does not
        assert_eq!(os_time_dly_resume(&TCB), Err(OsError::TaskSuspended));
        settle();
        assert!(recorded(&LOG).is_empty());

        os_task_resume(Some(&TCB)).unwrap();
        assert!(wait_until(|| recorded(&LOG).len() == 1));
        assert_eq!(recorded(&LOG)[0], Ok(()));
        assert!(wait_until(|| !TCB.is_created()));
    }

    #[test]
    fn test_delay_refused_while_locked() {
        static TCB: OsTcb = OsTcb::new();
        static LOG: Mutex<Vec<OsResult<()>>> = Mutex::new(Vec::new());

        fn sleeper(_: *mut ()) {
            record(&LOG, os_time_dly(1, opt::TIME_DLY));
        }

        let _guard = serial();
        os_sched_lock().unwrap();
        spawn(&TCB, "locked", sleeper, 10);
        assert!(wait_until(|| recorded(&LOG).len() == 1));
        os_sched_unlock().unwrap();
        assert_eq!(os_sched_unlock(), Err(OsError::SchedNotLocked));
        assert_eq!(recorded(&LOG)[0], Err(OsError::SchedLocked));
    }

    #[test]
    fn test_time_set() {
        let _guard = serial();
        let now = os_time_get();
        os_time_set(now.wrapping_add(1000));
        assert_eq!(os_time_get(), now.wrapping_add(1000));
        tick(1);
        assert_eq!(os_time_get(), now.wrapping_add(1001));
    }
}

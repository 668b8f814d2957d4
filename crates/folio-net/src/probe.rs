//! Accessibility prober.
//!
//! Decides whether a document reference is reachable and of the expected
//! kind before any rendering is attempted. Each attempt issues a `HEAD`;
//! hosts that reject `HEAD` with 405/501 get a `GET` in the same attempt,
//! and every later attempt goes straight to `GET`. A `HEAD` that succeeds
//! but says nothing useful about the content (generic type, no extension
//! on the reference) is also followed by a `GET` so the body can be
//! sniffed. Attempts, timeouts, and the pause between attempts come from
//! a [`RetryRun`].

use folio_sched::{AttemptFailure, RetryPolicy, RetryRun, RetryTimer, Step, TimerQueue};
use folio_types::model::{
    Accessibility, DocumentKind, Epoch, FailureReason, ProbeResult, SessionHandle,
};

use crate::http::Method;
use crate::transport::{ProbeReply, ProbeRequest, ProbeTicket};

/// What to probe, and on whose behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub session: SessionHandle,
    pub epoch: Epoch,
    /// The reference as supplied by the caller (used for extension hints).
    pub reference: String,
    /// The reference actually requested (usually the relay reference).
    pub url: String,
    pub expected: DocumentKind,
}

/// What the owner must do after feeding the prober a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStep {
    /// Hand this request to the transport.
    Send(ProbeRequest),
    /// Nothing to do yet.
    Pending,
    /// The probe is over.
    Finished(ProbeResult),
}

/// One probe of one reference under one epoch.
#[derive(Debug)]
pub struct Prober<T> {
    target: ProbeTarget,
    run: RetryRun<Epoch, T>,
    /// Method of the request currently in flight.
    in_flight: Option<Method>,
    head_unsupported: bool,
    last_reason: Option<FailureReason>,
    status_code: Option<u16>,
    content_type: Option<String>,
    declared_kind: Option<DocumentKind>,
    result: Option<ProbeResult>,
}

impl<T> Prober<T> {
    /// Start probing: returns the first request to send.
    ///
    /// Timers are armed in `timers` under the target's epoch; `wrap` turns
    /// them into the owner's timer payload.
    pub fn start(
        target: ProbeTarget,
        policy: RetryPolicy,
        timers: &mut TimerQueue<Epoch, T>,
        wrap: fn(RetryTimer) -> T,
        now_ms: u64,
    ) -> (Self, ProbeStep) {
        let (run, step) = RetryRun::start(policy, target.epoch, wrap, timers, now_ms);
        let mut prober = Self {
            target,
            run,
            in_flight: None,
            head_unsupported: false,
            last_reason: None,
            status_code: None,
            content_type: None,
            declared_kind: None,
            result: None,
        };
        let step = prober.follow(step);
        (prober, step)
    }

    /// Feed a transport reply. Replies for another session, epoch,
    /// attempt, or method than the one in flight are ignored.
    pub fn on_reply(
        &mut self,
        ticket: ProbeTicket,
        reply: ProbeReply,
        timers: &mut TimerQueue<Epoch, T>,
        now_ms: u64,
    ) -> ProbeStep {
        if !self.is_current(&ticket) {
            log::debug!(
                "dropping stale probe reply {} {} attempt {} ({:?})",
                ticket.session,
                ticket.epoch,
                ticket.attempt,
                ticket.method
            );
            return ProbeStep::Pending;
        }
        self.in_flight = None;

        let (status, content_type, sniffed) = match reply {
            ProbeReply::Response {
                status,
                content_type,
                sniffed,
            } => (status, content_type, sniffed),
            ProbeReply::Unreachable(detail) => {
                log::debug!(
                    "{} probe attempt {} unreachable: {detail}",
                    self.target.session,
                    ticket.attempt
                );
                return self.attempt_failed(
                    ticket.attempt,
                    FailureReason::ProbeUnreachable,
                    timers,
                    now_ms,
                );
            },
        };

        if ticket.method == Method::Head && matches!(status, 405 | 501) {
            log::debug!(
                "{} HEAD not supported ({status}); escalating to GET",
                self.target.session
            );
            self.head_unsupported = true;
            return ProbeStep::Send(self.request(ticket.attempt, Method::Get));
        }

        if ticket.method == Method::Head
            && (200..300).contains(&status)
            && self.needs_body(content_type.as_deref())
        {
            log::debug!(
                "{} HEAD gave no usable content type; sniffing with GET",
                self.target.session
            );
            return ProbeStep::Send(self.request(ticket.attempt, Method::Get));
        }

        self.status_code = Some(status);
        self.content_type = content_type;
        match classify(
            self.target.expected,
            &self.target.reference,
            status,
            self.content_type.as_deref(),
            sniffed,
        ) {
            Ok(kind) => {
                self.declared_kind = Some(kind);
                match self.run.succeed(ticket.attempt, timers) {
                    Step::Succeeded { attempt } => self.finish(Accessibility::Accessible, attempt),
                    _ => ProbeStep::Pending,
                }
            },
            Err(reason) => {
                if (200..300).contains(&status) {
                    self.declared_kind = self.content_type.as_deref().map(DocumentKind::from_mime);
                }
                self.attempt_failed(ticket.attempt, reason, timers, now_ms)
            },
        }
    }

    /// Feed back a timer armed by this prober.
    pub fn on_timer(
        &mut self,
        timer: RetryTimer,
        timers: &mut TimerQueue<Epoch, T>,
        now_ms: u64,
    ) -> ProbeStep {
        let step = self.run.on_timer(timer, timers, now_ms);
        if matches!(
            step,
            Step::Retrying {
                failure: AttemptFailure::TimedOut,
                ..
            } | Step::Exhausted {
                last: AttemptFailure::TimedOut,
                ..
            }
        ) {
            log::debug!("{} probe attempt timed out", self.target.session);
            self.in_flight = None;
            self.last_reason = Some(FailureReason::ProbeTimedOut);
        }
        self.follow(step)
    }

    /// Abandon the probe and disarm its timers.
    pub fn cancel(&mut self, timers: &mut TimerQueue<Epoch, T>) {
        self.run.cancel(timers);
        self.in_flight = None;
    }

    /// The final result, once finished.
    pub fn result(&self) -> Option<&ProbeResult> {
        self.result.as_ref()
    }

    /// Whether a request is in flight right now.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some() && self.run.is_running()
    }

    pub fn is_finished(&self) -> bool {
        self.run.is_finished()
    }

    pub fn attempt(&self) -> u32 {
        self.run.attempt()
    }

    pub fn target(&self) -> &ProbeTarget {
        &self.target
    }

    fn is_current(&self, ticket: &ProbeTicket) -> bool {
        ticket.session == self.target.session
            && ticket.epoch == self.target.epoch
            && ticket.attempt == self.run.attempt()
            && self.run.is_running()
            && self.in_flight == Some(ticket.method)
    }

    /// Whether only the body can tell if the expected kind is served.
    fn needs_body(&self, content_type: Option<&str>) -> bool {
        let declared = content_type.map_or(DocumentKind::Unknown, DocumentKind::from_mime);
        !self.target.expected.is_generic()
            && declared.is_generic()
            && DocumentKind::from_reference(&self.target.reference).is_generic()
    }

    fn attempt_failed(
        &mut self,
        attempt: u32,
        reason: FailureReason,
        timers: &mut TimerQueue<Epoch, T>,
        now_ms: u64,
    ) -> ProbeStep {
        log::debug!("{} probe attempt {attempt} failed: {reason}", self.target.session);
        self.last_reason = Some(reason);
        let step = self.run.fail(attempt, timers, now_ms);
        self.follow(step)
    }

    /// Translate a retry step into a probe step.
    fn follow(&mut self, step: Step) -> ProbeStep {
        if let Some(attempt) = step.launch_now() {
            let method = if self.head_unsupported {
                Method::Get
            } else {
                Method::Head
            };
            return ProbeStep::Send(self.request(attempt, method));
        }
        match step {
            Step::Exhausted { attempts, .. } => {
                log::warn!(
                    "{} {}: {} after {attempts} attempt(s)",
                    self.target.session,
                    FailureReason::ProbeExhausted,
                    self.last_reason.unwrap_or(FailureReason::ProbeExhausted)
                );
                self.finish(Accessibility::Inaccessible, attempts)
            },
            Step::Succeeded { attempt } => self.finish(Accessibility::Accessible, attempt),
            _ => ProbeStep::Pending,
        }
    }

    fn request(&mut self, attempt: u32, method: Method) -> ProbeRequest {
        self.in_flight = Some(method);
        ProbeRequest {
            ticket: ProbeTicket {
                session: self.target.session,
                epoch: self.target.epoch,
                attempt,
                method,
            },
            url: self.target.url.clone(),
        }
    }

    fn finish(&mut self, accessible: Accessibility, attempts_used: u32) -> ProbeStep {
        self.in_flight = None;
        let result = ProbeResult {
            accessible,
            content_type: self.content_type.clone(),
            declared_kind: self.declared_kind,
            status_code: self.status_code,
            attempts_used,
            last_failure_reason: match accessible {
                Accessibility::Accessible => None,
                _ => self.last_reason.or(Some(FailureReason::ProbeExhausted)),
            },
        };
        log::debug!(
            "{} probe finished: {:?} after {attempts_used} attempt(s)",
            self.target.session,
            accessible
        );
        self.result = Some(result.clone());
        ProbeStep::Finished(result)
    }
}

/// Classify one response against the expected kind.
///
/// A non-2xx status is a rejection. A generic declaration
/// (`application/octet-stream`, missing, unrecognized) defers to the
/// sniffed body prefix and then to the reference's extension.
pub fn classify(
    expected: DocumentKind,
    reference: &str,
    status: u16,
    content_type: Option<&str>,
    sniffed: Option<DocumentKind>,
) -> Result<DocumentKind, FailureReason> {
    if !(200..300).contains(&status) {
        return Err(FailureReason::ProbeRejected);
    }
    let declared = content_type.map_or(DocumentKind::Unknown, DocumentKind::from_mime);
    let effective = if declared.is_generic() {
        sniffed
            .filter(|k| !k.is_generic())
            .or_else(|| Some(DocumentKind::from_reference(reference)).filter(|k| !k.is_generic()))
            .unwrap_or(declared)
    } else {
        declared
    };
    if expected.is_generic() || effective == expected {
        Ok(effective)
    } else {
        Err(FailureReason::ProbeContentMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: SessionHandle = SessionHandle(1);
    const EPOCH: Epoch = Epoch(1);
    const PDF_REF: &str = "https://a.example/x.pdf";

    fn identity(t: RetryTimer) -> RetryTimer {
        t
    }

    fn target(reference: &str) -> ProbeTarget {
        ProbeTarget {
            session: SESSION,
            epoch: EPOCH,
            reference: reference.to_string(),
            url: format!("https://relay.example.net/r?url={reference}"),
            expected: DocumentKind::Pdf,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, 10_000, 1000)
    }

    fn begin(
        reference: &str,
        policy: RetryPolicy,
        timers: &mut TimerQueue<Epoch, RetryTimer>,
    ) -> (Prober<RetryTimer>, ProbeStep) {
        Prober::start(target(reference), policy, timers, identity, 0)
    }

    fn ok(content_type: &str) -> ProbeReply {
        ProbeReply::Response {
            status: 200,
            content_type: Some(content_type.to_string()),
            sniffed: None,
        }
    }

    fn status(code: u16) -> ProbeReply {
        ProbeReply::Response {
            status: code,
            content_type: None,
            sniffed: None,
        }
    }

    fn sent(step: &ProbeStep) -> ProbeTicket {
        match step {
            ProbeStep::Send(req) => req.ticket,
            other => panic!("expected Send, got {other:?}"),
        }
    }

    /// Expire due timers and return the last meaningful step.
    fn fire(
        prober: &mut Prober<RetryTimer>,
        timers: &mut TimerQueue<Epoch, RetryTimer>,
        now: u64,
    ) -> ProbeStep {
        let mut last = ProbeStep::Pending;
        for f in timers.expire(now) {
            let step = prober.on_timer(f.payload, timers, now);
            if step != ProbeStep::Pending {
                last = step;
            }
        }
        last
    }

    #[test]
    fn head_success_finishes_accessible() {
        let mut timers = TimerQueue::new();
        let (mut p, step) = begin(PDF_REF, policy(), &mut timers);
        let t = sent(&step);
        assert_eq!(t.method, Method::Head);
        assert_eq!(t.attempt, 1);

        let step = p.on_reply(t, ok("application/pdf"), &mut timers, 50);
        let ProbeStep::Finished(result) = step else {
            panic!("expected Finished");
        };
        assert!(result.is_accessible());
        assert_eq!(result.attempts_used, 1);
        assert_eq!(result.declared_kind, Some(DocumentKind::Pdf));
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.last_failure_reason, None);
        assert!(timers.is_empty());
    }

    #[test]
    fn head_405_escalates_to_get_in_same_attempt() {
        let mut timers = TimerQueue::new();
        let (mut p, step) = begin(PDF_REF, policy(), &mut timers);
        let head = sent(&step);

        let step = p.on_reply(head, status(405), &mut timers, 10);
        let get = sent(&step);
        assert_eq!(get.method, Method::Get);
        assert_eq!(get.attempt, 1);
        // The attempt's timeout keeps running.
        assert_eq!(timers.next_due(), Some(10_000));

        let step = p.on_reply(
            get,
            ProbeReply::Response {
                status: 200,
                content_type: Some("application/octet-stream".to_string()),
                sniffed: Some(DocumentKind::Pdf),
            },
            &mut timers,
            20,
        );
        assert!(matches!(step, ProbeStep::Finished(ref r) if r.is_accessible()));
    }

    #[test]
    fn generic_head_without_extension_is_sniffed_with_get() {
        let mut timers = TimerQueue::new();
        let (mut p, step) = begin("https://store.example.org/object?id=42", policy(), &mut timers);
        let head = sent(&step);

        let step = p.on_reply(head, ok("application/octet-stream"), &mut timers, 10);
        let get = sent(&step);
        assert_eq!(get.method, Method::Get);
        assert_eq!(get.attempt, 1);
        assert_eq!(timers.next_due(), Some(10_000));

        let step = p.on_reply(
            get,
            ProbeReply::Response {
                status: 200,
                content_type: Some("application/octet-stream".to_string()),
                sniffed: Some(DocumentKind::Pdf),
            },
            &mut timers,
            20,
        );
        let ProbeStep::Finished(result) = step else {
            panic!("expected Finished");
        };
        assert!(result.is_accessible());
        assert_eq!(result.attempts_used, 1);
        assert_eq!(result.declared_kind, Some(DocumentKind::Pdf));
    }

    #[test]
    fn generic_head_without_content_type_is_sniffed_with_get() {
        let mut timers = TimerQueue::new();
        let (mut p, step) = begin("https://a.example/download", policy(), &mut timers);
        let get = sent(&p.on_reply(sent(&step), status(200), &mut timers, 10));
        assert_eq!(get.method, Method::Get);

        // A body that is not a PDF still fails the attempt.
        let reply = ProbeReply::Response {
            status: 200,
            content_type: None,
            sniffed: Some(DocumentKind::Html),
        };
        assert_eq!(p.on_reply(get, reply, &mut timers, 20), ProbeStep::Pending);
        assert_eq!(p.attempt(), 1);
        assert!(!p.is_in_flight());

        // HEAD still works, so the next attempt starts with it again.
        let next = sent(&fire(&mut p, &mut timers, 1020));
        assert_eq!(next.attempt, 2);
        assert_eq!(next.method, Method::Head);
    }

    #[test]
    fn generic_head_with_extension_hint_needs_no_get() {
        let mut timers = TimerQueue::new();
        let (mut p, step) = begin(PDF_REF, policy(), &mut timers);
        let step = p.on_reply(sent(&step), ok("application/octet-stream"), &mut timers, 10);
        assert!(matches!(step, ProbeStep::Finished(ref r) if r.is_accessible()));
    }

    #[test]
    fn later_attempts_skip_head_once_unsupported() {
        let mut timers = TimerQueue::new();
        let (mut p, step) = begin(PDF_REF, policy(), &mut timers);
        let get = sent(&p.on_reply(sent(&step), status(501), &mut timers, 10));
        assert_eq!(p.on_reply(get, status(503), &mut timers, 20), ProbeStep::Pending);

        let t = sent(&fire(&mut p, &mut timers, 1020));
        assert_eq!(t.attempt, 2);
        assert_eq!(t.method, Method::Get);
    }

    #[test]
    fn exactly_three_attempts_then_inaccessible() {
        let mut timers = TimerQueue::new();
        let (mut p, step) = begin(PDF_REF, policy(), &mut timers);
        let mut ticket = sent(&step);
        let mut now = 0;
        let mut sends = 1;
        let result = loop {
            now += 5;
            let refused = ProbeReply::Unreachable("refused".into());
            match p.on_reply(ticket, refused, &mut timers, now) {
                ProbeStep::Finished(r) => break r,
                ProbeStep::Pending => {
                    now += 1000;
                    ticket = sent(&fire(&mut p, &mut timers, now));
                    sends += 1;
                },
                ProbeStep::Send(_) => panic!("no zero-delay retries expected"),
            }
        };
        assert_eq!(sends, 3);
        assert_eq!(result.attempts_used, 3);
        assert_eq!(result.accessible, Accessibility::Inaccessible);
        assert_eq!(result.last_failure_reason, Some(FailureReason::ProbeUnreachable));
        assert!(timers.is_empty());
    }

    #[test]
    fn timeouts_are_reported_as_probe_timed_out() {
        let mut timers = TimerQueue::new();
        let (mut p, _) = begin(PDF_REF, RetryPolicy::new(2, 500, 0), &mut timers);
        let second = sent(&fire(&mut p, &mut timers, 500));
        assert_eq!(second.attempt, 2);
        let ProbeStep::Finished(result) = fire(&mut p, &mut timers, 1000) else {
            panic!("expected Finished");
        };
        assert_eq!(result.last_failure_reason, Some(FailureReason::ProbeTimedOut));
        assert_eq!(result.attempts_used, 2);
    }

    #[test]
    fn wrong_kind_is_content_mismatch() {
        let mut timers = TimerQueue::new();
        let policy = RetryPolicy::new(1, 0, 0);
        let (mut p, step) = begin("https://a.example/login", policy, &mut timers);
        let step = p.on_reply(sent(&step), ok("text/html"), &mut timers, 1);
        let ProbeStep::Finished(result) = step else {
            panic!("expected Finished");
        };
        assert_eq!(
            result.last_failure_reason,
            Some(FailureReason::ProbeContentMismatch)
        );
        assert_eq!(result.declared_kind, Some(DocumentKind::Html));
        assert_eq!(result.content_type.as_deref(), Some("text/html"));
    }

    #[test]
    fn stale_replies_are_ignored() {
        let mut timers = TimerQueue::new();
        let (mut p, step) = begin(PDF_REF, policy(), &mut timers);
        let current = sent(&step);

        let old_epoch = ProbeTicket {
            epoch: Epoch(0),
            ..current
        };
        let wrong_attempt = ProbeTicket {
            attempt: 2,
            ..current
        };
        let wrong_method = ProbeTicket {
            method: Method::Get,
            ..current
        };
        let other_session = ProbeTicket {
            session: SessionHandle(9),
            ..current
        };
        for t in [old_epoch, wrong_attempt, wrong_method, other_session] {
            let step = p.on_reply(t, ok("application/pdf"), &mut timers, 5);
            assert_eq!(step, ProbeStep::Pending);
        }
        assert!(p.is_in_flight());
        assert!(p.result().is_none());
    }

    #[test]
    fn reply_after_timeout_is_ignored() {
        let mut timers = TimerQueue::new();
        let (mut p, step) = begin(PDF_REF, policy(), &mut timers);
        let first = sent(&step);
        fire(&mut p, &mut timers, 10_000);
        let step = p.on_reply(first, ok("application/pdf"), &mut timers, 10_001);
        assert_eq!(step, ProbeStep::Pending);
        assert!(!p.is_in_flight());
    }

    #[test]
    fn cancel_disarms_timers() {
        let mut timers = TimerQueue::new();
        let (mut p, step) = begin(PDF_REF, policy(), &mut timers);
        p.cancel(&mut timers);
        assert!(timers.is_empty());
        assert!(p.is_finished());
        let step = p.on_reply(sent(&step), ok("application/pdf"), &mut timers, 5);
        assert_eq!(step, ProbeStep::Pending);
    }

    #[test]
    fn classify_rules() {
        use DocumentKind::*;
        let pdf_ref = "https://a.example/doc.pdf?sig=1";
        let dl_ref = "https://a.example/dl";
        let octet = Some("application/octet-stream");
        assert_eq!(
            classify(Pdf, pdf_ref, 200, Some("application/pdf"), None),
            Ok(Pdf)
        );
        assert_eq!(
            classify(Pdf, pdf_ref, 404, Some("application/pdf"), None),
            Err(FailureReason::ProbeRejected)
        );
        assert_eq!(
            classify(Pdf, pdf_ref, 200, Some("text/html"), None),
            Err(FailureReason::ProbeContentMismatch)
        );
        // Generic declarations fall back to the sniffed prefix, then the extension.
        assert_eq!(classify(Pdf, pdf_ref, 200, octet, None), Ok(Pdf));
        assert_eq!(classify(Pdf, dl_ref, 200, None, Some(Pdf)), Ok(Pdf));
        assert_eq!(
            classify(Pdf, dl_ref, 200, octet, None),
            Err(FailureReason::ProbeContentMismatch)
        );
        // A generic expectation accepts any successful response.
        assert_eq!(
            classify(Unknown, "https://a.example/x", 204, Some("image/png"), None),
            Ok(Image)
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn answer(
            p: &mut Prober<RetryTimer>,
            kind: u8,
            ticket: ProbeTicket,
            timers: &mut TimerQueue<Epoch, RetryTimer>,
            now: u64,
        ) -> ProbeStep {
            match kind {
                0 => p.on_reply(ticket, ProbeReply::Unreachable("x".into()), timers, now),
                1 => p.on_reply(ticket, status(500), timers, now),
                2 => p.on_reply(ticket, ok("text/html"), timers, now),
                _ => ProbeStep::Pending,
            }
        }

        proptest! {
            /// Whatever the mix of failures, a probe that never succeeds
            /// sends requests for exactly `max_attempts` attempts.
            #[test]
            fn failing_probe_uses_every_attempt(
                max in 1u32..6,
                replies in proptest::collection::vec(0u8..4, 6),
            ) {
                let mut timers = TimerQueue::new();
                let policy = RetryPolicy::new(max, 400, 100);
                let (mut p, mut step) = begin(PDF_REF, policy, &mut timers);
                let mut now = 0u64;
                let mut attempts_seen = std::collections::BTreeSet::new();

                let result = loop {
                    match step {
                        ProbeStep::Finished(r) => break r,
                        ProbeStep::Send(req) => {
                            let attempt = req.ticket.attempt;
                            attempts_seen.insert(attempt);
                            now += 10;
                            let kind = replies[(attempt as usize - 1) % replies.len()];
                            step = answer(&mut p, kind, req.ticket, &mut timers, now);
                        },
                        ProbeStep::Pending => {
                            let due = timers.next_due();
                            prop_assert!(due.is_some());
                            now = due.unwrap_or(now);
                            step = fire(&mut p, &mut timers, now);
                        },
                    }
                };
                prop_assert_eq!(attempts_seen.len() as u32, max);
                prop_assert_eq!(result.attempts_used, max);
                prop_assert_eq!(result.accessible, Accessibility::Inaccessible);
                prop_assert!(result.last_failure_reason.is_some());
                prop_assert!(timers.is_empty());
            }
        }
    }
}

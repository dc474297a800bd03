use super::*;
use shared::util::match_stun;

impl sansio::Protocol<TaggedBytesMut, (), ()> for Session {
    type Rout = ();
    type Wout = TaggedBytesMut;
    type Eout = Event;
    type Error = Error;
    type Time = Instant;

    /// Takes one datagram received on a local candidate. Anything that is
    /// not STUN is handed back as `ErrNotStunPacket` for the caller to
    /// demultiplex.
    fn handle_read(&mut self, msg: TaggedBytesMut) -> std::result::Result<(), Self::Error> {
        if self.closed {
            return Err(Error::ErrSessionClosed);
        }
        if !match_stun(&msg.message) || !is_message(&msg.message) {
            return Err(Error::ErrNotStunPacket);
        }

        let mut m = Message::new();
        if let Err(err) = m.unmarshal_binary(&msg.message) {
            debug!(
                "[{}]: failed to decode STUN from {}: {}",
                self.get_name(),
                msg.transport.peer_addr,
                err
            );
            return Err(err);
        }

        self.handle_inbound(&m, msg.transport, msg.now)
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        None
    }

    fn handle_write(&mut self, _msg: ()) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.transmits
            .pop_front()
            .or_else(|| self.engine.poll_transmit())
    }

    fn handle_event(&mut self, _evt: ()) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.events.pop_front()
    }

    fn handle_timeout(&mut self, now: Self::Time) -> std::result::Result<(), Self::Error> {
        if self.closed {
            return Ok(());
        }

        self.engine.handle_timeout(now);
        self.handle_transaction_events(now);

        let mut due = vec![];
        while let Some(timer) = self.timers.pop_expired(now) {
            due.push(timer);
        }
        for timer in due {
            self.handle_session_timer(timer, now);
        }

        if self.scheduler.tick(now) {
            self.on_tick(now);
        }

        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        [
            self.engine.poll_timeout(),
            self.timers.poll_timeout(),
            self.scheduler.poll_timeout(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn close(&mut self) -> std::result::Result<(), Self::Error> {
        if self.closed {
            return Ok(());
        }
        info!("[{}]: closing session", self.get_name());

        self.closed = true;
        self.teardown();
        self.engine.close();
        self.transmits.clear();
        self.events.clear();
        self.permissions.clear();

        Ok(())
    }
}

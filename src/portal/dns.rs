use anyhow::{Context, Result};
use hickory_proto::{
    op::{Message, MessageType, OpCode},
    rr::{DNSClass, RData, Record, RecordType, rdata::A},
};
use log::{debug, info, warn};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::{net::UdpSocket, task::JoinHandle};
use tokio_util::sync::CancellationToken;

const ANSWER_TTL: u32 = 60;
/// Large enough for EDNS queries advertising a 4096 byte payload.
const MAX_DATAGRAM: usize = 4096;

/// Builds the reply to `query` resolving any A question to `address`.
///
/// Only the first question is answered; other record types get an empty
/// authoritative answer. Returns `None` for packets that are not standard
/// queries.
pub fn build_reply(query: &[u8], address: Ipv4Addr) -> Option<Vec<u8>> {
    let request = Message::from_vec(query).ok()?;
    if request.message_type() != MessageType::Query || request.op_code() != OpCode::Query {
        return None;
    }
    let question = request.queries().first()?.clone();

    let mut reply = Message::new();
    reply
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query)
        .set_authoritative(true)
        .set_recursion_desired(request.recursion_desired());

    if question.query_type() == RecordType::A && question.query_class() == DNSClass::IN {
        reply.add_answer(Record::from_rdata(
            question.name().clone(),
            ANSWER_TTL,
            RData::A(A(address)),
        ));
    }
    reply.add_query(question);

    reply.to_vec().ok()
}

/// Running DNS hijack responder.
pub struct DnsResponder {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl DnsResponder {
    /// Binds `listen` and answers every query with `address` until stopped.
    pub async fn spawn(listen: SocketAddr, address: Ipv4Addr) -> Result<Self> {
        let socket = UdpSocket::bind(listen)
            .await
            .with_context(|| format!("failed to bind dns responder to {listen}"))?;
        let token = CancellationToken::new();

        info!("portal: dns responder on {listen} resolving to {address}");

        let task = tokio::spawn(serve(socket, address, token.clone()));

        Ok(Self { token, task })
    }

    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!("portal: dns responder task failed: {e}");
        }
        info!("portal: dns responder stopped");
    }
}

async fn serve(socket: UdpSocket, address: Ipv4Addr, token: CancellationToken) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let (len, peer) = tokio::select! {
            _ = token.cancelled() => return,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    warn!("portal: dns receive failed: {e}");
                    continue;
                }
            },
        };

        let Some(reply) = build_reply(&buf[..len], address) else {
            debug!("portal: ignoring malformed dns packet from {peer}");
            continue;
        };

        if let Err(e) = socket.send_to(&reply, peer).await {
            warn!("portal: dns reply to {peer} failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::{
        op::{Edns, Query},
        rr::Name,
    };

    const PORTAL: Ipv4Addr = Ipv4Addr::new(10, 42, 0, 1);

    fn request(name: &str, record_type: RecordType) -> Message {
        let mut message = Message::new();
        message
            .set_id(0xabcd)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(
                Name::from_ascii(name).expect("valid name"),
                record_type,
            ));
        message
    }

    fn query(name: &str, record_type: RecordType) -> Vec<u8> {
        request(name, record_type)
            .to_vec()
            .expect("should encode query")
    }

    fn decode(reply: &[u8]) -> Message {
        Message::from_vec(reply).expect("should decode reply")
    }

    #[test]
    fn a_query_resolves_to_portal() {
        let reply = build_reply(&query("connectivitycheck.gstatic.com.", RecordType::A), PORTAL)
            .expect("should reply");
        let reply = decode(&reply);

        assert_eq!(reply.id(), 0xabcd);
        assert_eq!(reply.message_type(), MessageType::Response);
        assert!(reply.authoritative());
        assert!(reply.recursion_desired());
        assert_eq!(reply.queries().len(), 1);
        assert_eq!(reply.answers().len(), 1);
        assert_eq!(reply.answers()[0].ttl(), ANSWER_TTL);
        assert_eq!(reply.answers()[0].data(), Some(&RData::A(A(PORTAL))));
    }

    #[test]
    fn aaaa_query_gets_empty_answer() {
        let reply =
            build_reply(&query("example.com.", RecordType::AAAA), PORTAL).expect("should reply");
        let reply = decode(&reply);

        assert!(reply.answers().is_empty());
        assert_eq!(reply.queries()[0].query_type(), RecordType::AAAA);
    }

    #[test]
    fn edns_query_is_answered() {
        let mut message = request("example.com.", RecordType::A);
        let mut edns = Edns::new();
        edns.set_max_payload(4096);
        message.set_edns(edns);

        let reply = build_reply(&message.to_vec().expect("should encode"), PORTAL)
            .expect("should reply");

        assert_eq!(decode(&reply).answers().len(), 1);
    }

    #[test]
    fn malformed_packets_are_ignored() {
        assert!(build_reply(&[0; 5], PORTAL).is_none());

        let mut truncated = query("example.com.", RecordType::A);
        truncated.truncate(truncated.len() - 3);
        assert!(build_reply(&truncated, PORTAL).is_none());

        let mut response = request("example.com.", RecordType::A);
        response.set_message_type(MessageType::Response);
        let response = response.to_vec().expect("should encode");
        assert!(build_reply(&response, PORTAL).is_none());

        let mut empty = Message::new();
        empty.set_id(7).set_message_type(MessageType::Query);
        let empty = empty.to_vec().expect("should encode");
        assert!(build_reply(&empty, PORTAL).is_none());
    }

    #[tokio::test]
    async fn responder_answers_over_udp() {
        let listen: SocketAddr = "127.0.0.1:0".parse().expect("valid addr");
        let client = UdpSocket::bind(listen).await.expect("should bind");
        // reserve a free port for the responder
        let free = UdpSocket::bind(listen).await.expect("should bind");
        let responder_addr = free.local_addr().expect("should have addr");
        drop(free);

        let responder = DnsResponder::spawn(responder_addr, PORTAL)
            .await
            .expect("should spawn");
        client
            .send_to(&query("example.com.", RecordType::A), responder_addr)
            .await
            .expect("should send");
        let mut buf = [0u8; 512];
        let (len, _) = client.recv_from(&mut buf).await.expect("should receive");
        responder.stop().await;

        let reply = decode(&buf[..len]);
        assert_eq!(reply.answers()[0].data(), Some(&RData::A(A(PORTAL))));
    }
}

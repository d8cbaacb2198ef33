//! Message templates

use shared::models::{Order, OrderStatus};
use shared::money::format_inr;

use super::{Message, Recipient};

pub fn customer_recipient(order: &Order) -> Recipient {
    Recipient {
        email: order.delivery.email.clone(),
        phone: Some(order.delivery.phone.clone()),
    }
}

fn item_lines(order: &Order) -> String {
    order
        .items
        .iter()
        .map(|item| {
            format!(
                "- {} x{}  {}",
                item.product_name,
                item.quantity,
                format_inr(item.line_total())
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn totals(order: &Order) -> String {
    let delivery = if order.delivery_fee == 0 {
        "Free".to_string()
    } else {
        format_inr(order.delivery_fee)
    };
    format!(
        "Subtotal: {}\nDelivery: {}\nTotal: {}",
        format_inr(order.subtotal),
        delivery,
        format_inr(order.total)
    )
}

pub fn order_placed(order: &Order) -> Message {
    Message {
        subject: format!("Order {} received", order.order_number),
        body: format!(
            "Hi {},\n\nWe have received your order {}.\n\n{}\n\n{}\n\n\
             Complete the payment to confirm it. Unpaid orders are released after 30 minutes.",
            order.delivery.name,
            order.order_number,
            item_lines(order),
            totals(order)
        ),
    }
}

pub fn new_order_alert(order: &Order) -> Message {
    Message {
        subject: format!("New order {}", order.order_number),
        body: format!(
            "Order {} from {} ({})\n{}, {} {}\n\n{}\n\n{}",
            order.order_number,
            order.delivery.name,
            order.delivery.phone,
            order.delivery.address,
            order.delivery.city,
            order.delivery.pincode,
            item_lines(order),
            totals(order)
        ),
    }
}

pub fn payment_confirmed(order: &Order) -> Message {
    let invoice = order
        .invoice_url
        .as_deref()
        .map(|url| format!("\n\nInvoice: {url}"))
        .unwrap_or_default();
    Message {
        subject: format!("Payment received for order {}", order.order_number),
        body: format!(
            "Hi {},\n\nWe received {} for order {}. Your order is confirmed and will be \
             delivered to {}, {}.{}",
            order.delivery.name,
            format_inr(order.total),
            order.order_number,
            order.delivery.address,
            order.delivery.city,
            invoice
        ),
    }
}

pub fn payment_received_alert(order: &Order) -> Message {
    Message {
        subject: format!("Paid: {}", order.order_number),
        body: format!(
            "Order {} is paid ({}), payment {}.",
            order.order_number,
            format_inr(order.total),
            order.gateway_payment_id.as_deref().unwrap_or("-")
        ),
    }
}

pub fn status_changed(order: &Order, status: OrderStatus) -> Message {
    let line = match status {
        OrderStatus::Confirmed => "has been confirmed",
        OrderStatus::Processing => "is being prepared",
        OrderStatus::Shipped => "is out for delivery",
        OrderStatus::Delivered => "has been delivered. Enjoy your meal",
        OrderStatus::Cancelled => "has been cancelled",
        OrderStatus::Pending => "is awaiting payment",
    };
    Message {
        subject: format!("Order {} update", order.order_number),
        body: format!(
            "Hi {},\n\nYour order {} {}.",
            order.delivery.name, order.order_number, line
        ),
    }
}

pub fn stock_reset_summary(restocked: u64) -> Message {
    Message {
        subject: "Daily stock reset".to_string(),
        body: format!("{restocked} products were restocked to their default levels."),
    }
}

pub fn payment_after_cancel_alert(order: &Order, gateway_payment_id: &str) -> Message {
    Message {
        subject: format!("Refund needed: {}", order.order_number),
        body: format!(
            "Payment {} of {} was captured for order {}, but the order stays cancelled. \
             Refund the customer ({}, {}).",
            gateway_payment_id,
            format_inr(order.total),
            order.order_number,
            order.delivery.name,
            order.delivery.phone
        ),
    }
}

pub fn duplicate_payment_alert(order: &Order, gateway_payment_id: &str) -> Message {
    Message {
        subject: format!("Duplicate payment: {}", order.order_number),
        body: format!(
            "Payment {} of {} was captured for order {}, which was already paid by {}. \
             Refund the extra payment ({}, {}).",
            gateway_payment_id,
            format_inr(order.total),
            order.order_number,
            order.gateway_payment_id.as_deref().unwrap_or("-"),
            order.delivery.name,
            order.delivery.phone
        ),
    }
}
